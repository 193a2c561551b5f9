//! Store setup: drop, recreate and fill with sample contacts.

use std::io::Write;

use tracing::info;

use crate::error::Result;
use crate::model::Contact;
use crate::provider::{ContextProvider, DynamicContextProvider};
use crate::session::{SaveSummary, Session};

/// Contacts inserted by a default run.
pub const DEFAULT_CONTACTS: usize = 4000;

const PROGRESS_EVERY: usize = 1000;

/// Deletes the store if present, then creates it empty.
pub fn recreate_database<W: Write + ?Sized>(session: &mut Session, out: &mut W) -> Result<()> {
    let mut db = session.database();
    let exists = db.exists();
    writeln!(
        out,
        "Database {}",
        if exists { "Exists" } else { "Does Not Exist" }
    )?;
    if exists {
        writeln!(out, "Deleting Database")?;
        db.delete()?;
    }
    writeln!(out, "Creating Database")?;
    db.create()?;
    Ok(())
}

/// Queues `count` contacts named `Contact {i}` and saves them in one batch.
pub fn add_some_contacts<W: Write + ?Sized>(
    session: &mut Session,
    count: usize,
    out: &mut W,
) -> Result<SaveSummary> {
    writeln!(out, "Adding Contacts")?;
    for i in 0..count {
        if (i + 1) % PROGRESS_EVERY == 0 {
            writeln!(out, "{}", i + 1)?;
        }
        session.add_contact(Contact::new(format!("Contact {i}")));
    }
    writeln!(out, "Saving Changes")?;
    let summary = session.save_changes()?;
    info!(contacts = summary.inserted, "seed.saved");
    Ok(summary)
}

/// Recreates the store and seeds it through one throwaway session.
pub fn setup_database<W: Write + ?Sized>(
    provider: &DynamicContextProvider,
    contacts: usize,
    out: &mut W,
) -> Result<()> {
    let mut ctx = provider.get_context()?;
    recreate_database(&mut ctx, out)?;
    add_some_contacts(&mut ctx, contacts, out)?;
    ctx.close()
}
