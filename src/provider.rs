//! Context providers: how callers obtain a [`Session`].

use std::cell::{RefCell, RefMut};
use std::ops::{Deref, DerefMut};

use tracing::trace;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::store::ConnectionString;

/// Session handle returned by a [`ContextProvider`].
///
/// An owned context closes its session when dropped; a shared one only
/// releases the borrow on the provider's session.
pub enum Context<'a> {
    /// A session created for this call alone.
    Owned(Session),
    /// The provider's long-lived session.
    Shared(RefMut<'a, Session>),
}

impl Context<'_> {
    /// Whether this handle refers to a session that outlives it.
    pub fn is_shared(&self) -> bool {
        matches!(self, Context::Shared(_))
    }
}

impl Deref for Context<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        match self {
            Context::Owned(session) => session,
            Context::Shared(session) => session,
        }
    }
}

impl DerefMut for Context<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        match self {
            Context::Owned(session) => session,
            Context::Shared(session) => session,
        }
    }
}

/// Source of sessions for the benchmark runner.
pub trait ContextProvider {
    /// Returns a session handle.
    fn get_context(&self) -> Result<Context<'_>>;

    /// Short name used in logs.
    fn label(&self) -> &'static str;
}

/// Hands out a brand-new session on every call.
#[derive(Clone, Debug)]
pub struct DynamicContextProvider {
    target: ConnectionString,
}

impl DynamicContextProvider {
    /// Creates a provider for sessions bound to `target`.
    pub fn new(target: ConnectionString) -> Self {
        Self { target }
    }
}

impl ContextProvider for DynamicContextProvider {
    fn get_context(&self) -> Result<Context<'_>> {
        trace!("provider.dynamic.new_session");
        Ok(Context::Owned(Session::new(self.target.clone())))
    }

    fn label(&self) -> &'static str {
        "dynamic"
    }
}

/// Hands out the same session on every call.
///
/// Only one handle may be alive at a time; asking for another while the
/// previous one is held yields [`Error::SessionBusy`].
pub struct StaticContextProvider {
    session: RefCell<Session>,
}

impl StaticContextProvider {
    /// Creates the provider and its single session bound to `target`.
    pub fn new(target: ConnectionString) -> Self {
        Self {
            session: RefCell::new(Session::new(target)),
        }
    }

    /// Gives up the shared session.
    pub fn into_session(self) -> Session {
        self.session.into_inner()
    }
}

impl ContextProvider for StaticContextProvider {
    fn get_context(&self) -> Result<Context<'_>> {
        self.session
            .try_borrow_mut()
            .map(Context::Shared)
            .map_err(|_| Error::SessionBusy)
    }

    fn label(&self) -> &'static str {
        "static"
    }
}
