//! Unit-of-work sessions.
//!
//! A [`Session`] owns at most one SQLite connection, opened on first use, plus
//! an identity map of every contact and account it has loaded. Loading an id
//! that is already tracked yields the tracked instance. Writes are not issued
//! until [`Session::save_changes`], which compares each tracked contact and
//! account with the snapshot taken when it was loaded and flushes the
//! differences in one transaction.

use std::rc::Rc;

use rusqlite::{Connection, Params};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::model::{track, Account, AccountId, Contact, ContactId, Tracked};
use crate::store::{self, ConnectionString};

const SELECT_CONTACTS: &str = "SELECT c.id, c.name, c.account_id, a.name \
     FROM contacts c LEFT JOIN accounts a ON a.id = c.account_id";
const SELECT_CONTACT_BY_ID: &str = "SELECT c.id, c.name, c.account_id, a.name \
     FROM contacts c LEFT JOIN accounts a ON a.id = c.account_id WHERE c.id = ?1";
const INSERT_ACCOUNT: &str = "INSERT INTO accounts (name) VALUES (?1)";
const INSERT_CONTACT: &str = "INSERT INTO contacts (name, account_id) VALUES (?1, ?2)";
const UPDATE_CONTACT: &str = "UPDATE contacts SET name = ?1, account_id = ?2 WHERE id = ?3";
const UPDATE_ACCOUNT: &str = "UPDATE accounts SET name = ?1 WHERE id = ?2";

/// Counters describing the work a session has done.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionStats {
    /// Queries sent to the store.
    pub queries: u64,
    /// Lookups answered from the identity map.
    pub identity_hits: u64,
    /// Lookups that had to query the store.
    pub identity_misses: u64,
    /// Saves that committed at least one write.
    pub saves: u64,
    /// Rows inserted across all saves.
    pub inserted: u64,
    /// Rows updated across all saves.
    pub updated: u64,
}

impl SessionStats {
    /// Difference between `self` and an earlier reading of the same session.
    pub fn since(&self, earlier: &SessionStats) -> SessionStats {
        SessionStats {
            queries: self.queries.saturating_sub(earlier.queries),
            identity_hits: self.identity_hits.saturating_sub(earlier.identity_hits),
            identity_misses: self.identity_misses.saturating_sub(earlier.identity_misses),
            saves: self.saves.saturating_sub(earlier.saves),
            inserted: self.inserted.saturating_sub(earlier.inserted),
            updated: self.updated.saturating_sub(earlier.updated),
        }
    }

    /// Adds `other` into `self`.
    pub fn absorb(&mut self, other: &SessionStats) {
        self.queries += other.queries;
        self.identity_hits += other.identity_hits;
        self.identity_misses += other.identity_misses;
        self.saves += other.saves;
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

/// Rows written by one [`Session::save_changes`] call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SaveSummary {
    /// Newly inserted account and contact rows.
    pub inserted: usize,
    /// Existing contact and account rows rewritten.
    pub updated: usize,
}

struct TrackedContact {
    entity: Tracked<Contact>,
    original_name: String,
    original_account: Option<AccountId>,
}

impl TrackedContact {
    fn new(entity: Tracked<Contact>) -> Self {
        let (original_name, original_account) = {
            let contact = entity.borrow();
            (contact.name.clone(), contact.account_id())
        };
        Self {
            entity,
            original_name,
            original_account,
        }
    }

    fn is_modified(&self) -> bool {
        let contact = self.entity.borrow();
        if contact.name != self.original_name {
            return true;
        }
        match &contact.account {
            None => self.original_account.is_some(),
            Some(acc) => match acc.borrow().id {
                None => true,
                current => current != self.original_account,
            },
        }
    }

    /// Takes the current state as the new snapshot.
    fn accept(&mut self) {
        let contact = self.entity.borrow();
        self.original_name.clone_from(&contact.name);
        self.original_account = contact.account_id();
    }
}

struct TrackedAccount {
    entity: Tracked<Account>,
    original_name: String,
}

impl TrackedAccount {
    fn new(entity: Tracked<Account>) -> Self {
        let original_name = entity.borrow().name.clone();
        Self {
            entity,
            original_name,
        }
    }

    fn is_modified(&self) -> bool {
        self.entity.borrow().name != self.original_name
    }

    fn accept(&mut self) {
        self.original_name.clone_from(&self.entity.borrow().name);
    }
}

struct ContactRow {
    id: ContactId,
    name: String,
    account: Option<(AccountId, String)>,
}

/// A unit-of-work handle bound to one store location.
pub struct Session {
    target: ConnectionString,
    conn: Option<Connection>,
    contacts: FxHashMap<ContactId, TrackedContact>,
    accounts: FxHashMap<AccountId, TrackedAccount>,
    added_contacts: Vec<Tracked<Contact>>,
    added_accounts: Vec<Tracked<Account>>,
    stats: SessionStats,
}

impl Session {
    /// Creates a session for `target`. No connection is opened yet.
    pub fn new(target: ConnectionString) -> Self {
        Self {
            target,
            conn: None,
            contacts: FxHashMap::default(),
            accounts: FxHashMap::default(),
            added_contacts: Vec::new(),
            added_accounts: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    /// Store location this session is bound to.
    pub fn connection_string(&self) -> &ConnectionString {
        &self.target
    }

    /// Store-level operations (existence, delete, create).
    pub fn database(&mut self) -> Database<'_> {
        Database { session: self }
    }

    /// Loads every contact in store order, resolving rows through the
    /// identity map.
    pub fn contacts(&mut self) -> Result<Vec<Tracked<Contact>>> {
        let rows = self.load_rows(SELECT_CONTACTS, [])?;
        Ok(rows.into_iter().map(|row| self.attach(row)).collect())
    }

    /// Returns the one contact with `id`.
    ///
    /// A tracked contact is returned without querying the store. Otherwise
    /// exactly one row must match.
    pub fn single_contact(&mut self, id: ContactId) -> Result<Tracked<Contact>> {
        if let Some(tracked) = self.contacts.get(&id) {
            self.stats.identity_hits += 1;
            return Ok(Rc::clone(&tracked.entity));
        }
        self.stats.identity_misses += 1;
        let mut rows = self.load_rows(SELECT_CONTACT_BY_ID, [id.0])?;
        if rows.len() != 1 {
            return Err(Error::NotSingle {
                id,
                found: rows.len(),
            });
        }
        let row = rows.remove(0);
        Ok(self.attach(row))
    }

    /// Queues a new contact for insertion on the next save.
    pub fn add_contact(&mut self, contact: Contact) -> Tracked<Contact> {
        let entity = track(contact);
        self.added_contacts.push(Rc::clone(&entity));
        entity
    }

    /// Queues a new account for insertion on the next save.
    pub fn add_account(&mut self, account: Account) -> Tracked<Account> {
        let entity = track(account);
        self.added_accounts.push(Rc::clone(&entity));
        entity
    }

    /// Number of saved contacts currently tracked.
    pub fn tracked_contacts(&self) -> usize {
        self.contacts.len()
    }

    /// Whether the next save would write anything.
    pub fn has_changes(&self) -> bool {
        !self.added_contacts.is_empty()
            || !self.added_accounts.is_empty()
            || self.contacts.values().any(TrackedContact::is_modified)
            || self.accounts.values().any(TrackedAccount::is_modified)
    }

    /// Counters accumulated since the session was created.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Flushes pending inserts and modified rows in one transaction.
    ///
    /// Store ids are assigned to new entities only after the commit succeeds,
    /// so a failed save leaves every change pending.
    pub fn save_changes(&mut self) -> Result<SaveSummary> {
        let dirty_contacts = self.modified_contacts();
        let dirty_accounts = self.modified_accounts();
        if dirty_contacts.is_empty()
            && dirty_accounts.is_empty()
            && self.added_contacts.is_empty()
            && self.added_accounts.is_empty()
        {
            trace!("session.save.noop");
            return Ok(SaveSummary::default());
        }

        let mut new_accounts: Vec<Tracked<Account>> = Vec::new();
        for acc in &self.added_accounts {
            push_unsaved(&mut new_accounts, acc);
        }
        let linked = self
            .added_contacts
            .iter()
            .chain(dirty_contacts.iter().map(|(_, contact)| contact));
        for contact in linked {
            if let Some(acc) = &contact.borrow().account {
                push_unsaved(&mut new_accounts, acc);
            }
        }

        let conn = ensure_open(&mut self.conn, &self.target, store::open)?;
        let tx = conn.unchecked_transaction()?;
        let mut account_ids = Vec::with_capacity(new_accounts.len());
        let mut contact_ids = Vec::with_capacity(self.added_contacts.len());
        {
            let mut insert = tx.prepare_cached(INSERT_ACCOUNT)?;
            for acc in &new_accounts {
                insert.execute([&acc.borrow().name])?;
                account_ids.push(AccountId(tx.last_insert_rowid()));
            }

            let mut insert = tx.prepare_cached(INSERT_CONTACT)?;
            for contact in &self.added_contacts {
                let contact = contact.borrow();
                let account_id = resolve_account(&contact, &new_accounts, &account_ids);
                insert.execute((&contact.name, account_id.map(|id| id.0)))?;
                contact_ids.push(ContactId(tx.last_insert_rowid()));
            }

            let mut update = tx.prepare_cached(UPDATE_ACCOUNT)?;
            for (id, acc) in &dirty_accounts {
                update.execute((&acc.borrow().name, id.0))?;
            }

            let mut update = tx.prepare_cached(UPDATE_CONTACT)?;
            for (id, contact) in &dirty_contacts {
                let contact = contact.borrow();
                let account_id = resolve_account(&contact, &new_accounts, &account_ids);
                update.execute((&contact.name, account_id.map(|id| id.0), id.0))?;
            }
        }
        tx.commit()?;

        for (acc, id) in new_accounts.iter().zip(&account_ids) {
            acc.borrow_mut().id = Some(*id);
            self.accounts.insert(*id, TrackedAccount::new(Rc::clone(acc)));
        }
        let added = std::mem::take(&mut self.added_contacts);
        for (contact, id) in added.into_iter().zip(&contact_ids) {
            contact.borrow_mut().id = Some(*id);
            self.contacts.insert(*id, TrackedContact::new(contact));
        }
        self.added_accounts.clear();
        for (id, _) in &dirty_accounts {
            if let Some(tracked) = self.accounts.get_mut(id) {
                tracked.accept();
            }
        }
        for (id, _) in &dirty_contacts {
            if let Some(tracked) = self.contacts.get_mut(id) {
                tracked.accept();
            }
        }

        let summary = SaveSummary {
            inserted: account_ids.len() + contact_ids.len(),
            updated: dirty_accounts.len() + dirty_contacts.len(),
        };
        self.stats.saves += 1;
        self.stats.inserted += summary.inserted as u64;
        self.stats.updated += summary.updated as u64;
        debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            tracked = self.contacts.len(),
            "session.save"
        );
        Ok(summary)
    }

    /// Closes the connection, surfacing any error SQLite reports on close.
    pub fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| err)?;
        }
        Ok(())
    }

    fn load_rows<P: Params>(&mut self, sql: &str, params: P) -> Result<Vec<ContactRow>> {
        let conn = ensure_open(&mut self.conn, &self.target, store::open)?;
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                let account = match row.get::<_, Option<i64>>(2)? {
                    Some(id) => Some((AccountId(id), row.get::<_, String>(3)?)),
                    None => None,
                };
                Ok(ContactRow {
                    id: ContactId(row.get(0)?),
                    name: row.get(1)?,
                    account,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        self.stats.queries += 1;
        Ok(rows)
    }

    fn attach(&mut self, row: ContactRow) -> Tracked<Contact> {
        if let Some(existing) = self.contacts.get(&row.id) {
            return Rc::clone(&existing.entity);
        }
        let account = row.account.map(|(id, name)| {
            let tracked = self.accounts.entry(id).or_insert_with(|| {
                TrackedAccount::new(track(Account {
                    id: Some(id),
                    name,
                }))
            });
            Rc::clone(&tracked.entity)
        });
        let entity = track(Contact {
            id: Some(row.id),
            name: row.name,
            account,
        });
        self.contacts.insert(row.id, TrackedContact::new(Rc::clone(&entity)));
        entity
    }

    fn modified_contacts(&self) -> Vec<(ContactId, Tracked<Contact>)> {
        let mut dirty: Vec<_> = self
            .contacts
            .iter()
            .filter(|(_, tracked)| tracked.is_modified())
            .map(|(id, tracked)| (*id, Rc::clone(&tracked.entity)))
            .collect();
        dirty.sort_unstable_by_key(|(id, _)| *id);
        dirty
    }

    fn modified_accounts(&self) -> Vec<(AccountId, Tracked<Account>)> {
        let mut dirty: Vec<_> = self
            .accounts
            .iter()
            .filter(|(_, tracked)| tracked.is_modified())
            .map(|(id, tracked)| (*id, Rc::clone(&tracked.entity)))
            .collect();
        dirty.sort_unstable_by_key(|(id, _)| *id);
        dirty
    }

    /// Drops the connection and forgets everything tracked.
    fn reset(&mut self) {
        self.conn = None;
        self.contacts.clear();
        self.accounts.clear();
        self.added_contacts.clear();
        self.added_accounts.clear();
    }
}

/// Store-level operations on the session's backing database.
pub struct Database<'a> {
    session: &'a mut Session,
}

impl Database<'_> {
    /// Whether the backing store exists.
    pub fn exists(&self) -> bool {
        store::exists(self.session.target.path())
    }

    /// Deletes the backing store. The session's connection is closed first
    /// and its tracked state discarded.
    pub fn delete(&mut self) -> Result<()> {
        self.session.reset();
        store::delete(self.session.target.path())
    }

    /// Creates the backing store with an empty schema.
    pub fn create(&mut self) -> Result<()> {
        let session = &mut *self.session;
        let conn = ensure_open(&mut session.conn, &session.target, store::open_or_create)?;
        store::create_schema(conn)?;
        debug!(path = %session.target.path().display(), "store.created");
        Ok(())
    }
}

fn ensure_open<'a>(
    slot: &'a mut Option<Connection>,
    target: &ConnectionString,
    opener: fn(&ConnectionString) -> Result<Connection>,
) -> Result<&'a Connection> {
    let conn = match slot.take() {
        Some(conn) => conn,
        None => {
            trace!(path = %target.path().display(), "session.open");
            opener(target)?
        }
    };
    Ok(slot.insert(conn))
}

fn push_unsaved(list: &mut Vec<Tracked<Account>>, acc: &Tracked<Account>) {
    if acc.borrow().id.is_none() && !list.iter().any(|seen| Rc::ptr_eq(seen, acc)) {
        list.push(Rc::clone(acc));
    }
}

fn resolve_account(
    contact: &Contact,
    new_accounts: &[Tracked<Account>],
    new_ids: &[AccountId],
) -> Option<AccountId> {
    let acc = contact.account.as_ref()?;
    if let Some(id) = acc.borrow().id {
        return Some(id);
    }
    new_accounts
        .iter()
        .position(|candidate| Rc::ptr_eq(candidate, acc))
        .map(|idx| new_ids[idx])
}
