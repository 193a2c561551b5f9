//! Entity types for the two-table benchmark schema.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Store-assigned identifier of an [`Account`] row.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct AccountId(pub i64);

/// Store-assigned identifier of a [`Contact`] row.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ContactId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared handle to an entity instance owned by a session's identity map.
///
/// Two handles refer to the same instance when [`Rc::ptr_eq`] holds.
pub type Tracked<T> = Rc<RefCell<T>>;

/// Wraps a fresh entity so it can be linked and queued on a session.
pub fn track<T>(entity: T) -> Tracked<T> {
    Rc::new(RefCell::new(entity))
}

/// An account row. `id` stays `None` until the owning session saves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Row id once saved.
    pub id: Option<AccountId>,
    /// Display name.
    pub name: String,
}

impl Account {
    /// Creates an unsaved account.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

/// A contact row with an optional link to the account it owns.
#[derive(Debug, Clone)]
pub struct Contact {
    /// Row id once saved.
    pub id: Option<ContactId>,
    /// Display name.
    pub name: String,
    /// Owned account link.
    pub account: Option<Tracked<Account>>,
}

impl Contact {
    /// Creates an unsaved contact without an account link.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            account: None,
        }
    }

    /// Id of the linked account, if the link points at a saved row.
    pub fn account_id(&self) -> Option<AccountId> {
        self.account.as_ref().and_then(|acc| acc.borrow().id)
    }
}
