use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, Entity, PersonId};

/// Person status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonStatus {
    Active,
    Inactive,
}

/// Contact information for a person or supplier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Result of a status lookup against the directory.
///
/// `NotFound` is distinct from `Inactive`: check-outs report the former
/// as a missing person and the latter as an eligibility failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonPresence {
    Active,
    Inactive,
    NotFound,
}

/// A person stock can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    id: PersonId,
    code: String,
    name: String,
    role: Option<String>,
    contact: ContactInfo,
    status: PersonStatus,
    registered_at: DateTime<Utc>,
}

impl Person {
    pub fn new(
        id: PersonId,
        code: String,
        name: String,
        role: Option<String>,
        contact: ContactInfo,
        registered_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if code.trim().is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }

        Ok(Self {
            id,
            code,
            name,
            role,
            contact,
            status: PersonStatus::Active,
            registered_at,
        })
    }

    pub fn id_typed(&self) -> PersonId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> PersonStatus {
        self.status
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Invariant helper: only active people may receive stock.
    pub fn can_receive_stock(&self) -> bool {
        self.status == PersonStatus::Active
    }

    pub fn set_status(&mut self, status: PersonStatus) {
        self.status = status;
    }
}

impl Entity for Person {
    type Id = PersonId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Lookup port consumed by the assignment ledger.
pub trait PersonDirectory: Send + Sync {
    fn presence_of(&self, person_id: PersonId) -> PersonPresence;

    fn person(&self, person_id: PersonId) -> Option<Person>;
}

impl<D> PersonDirectory for Arc<D>
where
    D: PersonDirectory + ?Sized,
{
    fn presence_of(&self, person_id: PersonId) -> PersonPresence {
        (**self).presence_of(person_id)
    }

    fn person(&self, person_id: PersonId) -> Option<Person> {
        (**self).person(person_id)
    }
}

/// In-memory person directory for tests/dev.
///
/// Codes are sequential within the directory: PER001, PER002, ...
#[derive(Debug, Default)]
pub struct InMemoryPersonDirectory {
    inner: RwLock<HashMap<PersonId, Person>>,
}

impl InMemoryPersonDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new person with the next sequential code.
    pub fn register(
        &self,
        name: impl Into<String>,
        role: Option<String>,
        contact: ContactInfo,
        registered_at: DateTime<Utc>,
    ) -> DomainResult<Person> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| DomainError::invariant("person directory lock poisoned"))?;

        let code = next_code("PER", map.values().map(Person::code));
        let person = Person::new(
            PersonId::new(),
            code,
            name.into(),
            role,
            contact,
            registered_at,
        )?;
        map.insert(person.id_typed(), person.clone());
        Ok(person)
    }

    pub fn set_status(&self, person_id: PersonId, status: PersonStatus) -> DomainResult<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| DomainError::invariant("person directory lock poisoned"))?;

        let person = map
            .get_mut(&person_id)
            .ok_or(DomainError::PersonNotFound(person_id))?;
        person.set_status(status);
        Ok(())
    }

    /// Remove a person. `has_assignments` reports whether any assignment
    /// history references them; removal is refused while one exists, so
    /// recorded custody always resolves to a person.
    pub fn remove(
        &self,
        person_id: PersonId,
        has_assignments: impl FnOnce(PersonId) -> bool,
    ) -> DomainResult<Person> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| DomainError::invariant("person directory lock poisoned"))?;

        if !map.contains_key(&person_id) {
            return Err(DomainError::PersonNotFound(person_id));
        }
        if has_assignments(person_id) {
            return Err(DomainError::validation(
                "person has recorded assignments and cannot be removed",
            ));
        }

        map.remove(&person_id)
            .ok_or(DomainError::PersonNotFound(person_id))
    }

    pub fn list(&self) -> Vec<Person> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };
        let mut people: Vec<Person> = map.values().cloned().collect();
        people.sort_by(|a, b| a.code().cmp(b.code()));
        people
    }
}

impl PersonDirectory for InMemoryPersonDirectory {
    fn presence_of(&self, person_id: PersonId) -> PersonPresence {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return PersonPresence::NotFound,
        };
        match map.get(&person_id) {
            Some(p) if p.can_receive_stock() => PersonPresence::Active,
            Some(_) => PersonPresence::Inactive,
            None => PersonPresence::NotFound,
        }
    }

    fn person(&self, person_id: PersonId) -> Option<Person> {
        let map = self.inner.read().ok()?;
        map.get(&person_id).cloned()
    }
}

/// Next sequential directory code: `{prefix}{n:03}` where `n` is one past
/// the highest suffix already issued. Codes with a foreign prefix or a
/// non-numeric suffix are ignored.
pub(crate) fn next_code<'a>(prefix: &str, existing: impl Iterator<Item = &'a str>) -> String {
    let max = existing
        .filter_map(|code| code.strip_prefix(prefix))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}{:03}", max + 1)
}
