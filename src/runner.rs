//! The read-then-write loop timed by the benchmark.

use tracing::{debug, info};

use crate::error::Result;
use crate::model::{track, Account};
use crate::provider::ContextProvider;
use crate::session::SessionStats;

/// Contacts processed by a default run.
pub const DEFAULT_TAKE: usize = 2000;

/// Outcome of one [`run_test`] call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunReport {
    /// Contacts returned by the initial load.
    pub loaded: usize,
    /// Contacts fetched, linked and saved.
    pub processed: usize,
    /// Session counters observed through the handles used by the run.
    pub stats: SessionStats,
}

/// Links a fresh account to each of the first `take` contacts.
///
/// Every iteration asks `provider` for a session, fetches the contact by id,
/// attaches a new account named after it and saves. Errors abort the run.
pub fn run_test<P: ContextProvider + ?Sized>(provider: &P, take: usize) -> Result<RunReport> {
    let mut report = RunReport::default();

    let contacts = {
        let mut ctx = provider.get_context()?;
        let before = ctx.stats();
        let contacts = ctx.contacts()?;
        report.stats.absorb(&ctx.stats().since(&before));
        contacts
    };
    report.loaded = contacts.len();
    debug!(provider = provider.label(), loaded = report.loaded, "runner.loaded");

    let targets = contacts.iter().take(take).filter_map(|contact| {
        let contact = contact.borrow();
        let id = contact.id?;
        Some((id, contact.name.clone()))
    });
    for (id, name) in targets {
        let mut ctx = provider.get_context()?;
        let before = ctx.stats();

        let local = ctx.single_contact(id)?;
        local.borrow_mut().account = Some(track(Account::new(name)));
        ctx.save_changes()?;

        report.stats.absorb(&ctx.stats().since(&before));
        report.processed += 1;
    }

    info!(
        provider = provider.label(),
        processed = report.processed,
        queries = report.stats.queries,
        identity_hits = report.stats.identity_hits,
        saves = report.stats.saves,
        "runner.done"
    );
    Ok(report)
}
