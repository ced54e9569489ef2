use tracing::info;

use yoman_core::types::{new_row_id, UserId};
use yoman_hebrew::fuzzy;

use crate::db::Db;
use crate::error::{DomainError, Result};
use crate::types::Contact;

/// Owner of the `contacts` table.
pub struct ContactService {
    db: Db,
}

impl ContactService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        user_id: &UserId,
        name: &str,
        phone: Option<&str>,
        aliases: Vec<String>,
    ) -> Result<Contact> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::EmptyTitle);
        }
        let id = new_row_id();
        let aliases_json = serde_json::to_string(&aliases)?;
        {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO contacts (id, user_id, name, phone, aliases)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, user_id.as_str(), name, phone, aliases_json],
            )?;
        }
        info!(contact_id = %id, user_id = %user_id, "contact created");
        Ok(Contact {
            id,
            user_id: user_id.clone(),
            name: name.to_string(),
            phone: phone.map(String::from),
            aliases,
        })
    }

    pub fn list(&self, user_id: &UserId) -> Result<Vec<Contact>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, name, phone, aliases FROM contacts
             WHERE user_id = ?1 ORDER BY name",
        )?;
        let contacts = stmt
            .query_map(rusqlite::params![user_id.as_str()], row_to_contact)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(contacts)
    }

    /// Contact names only — injected into the NLU prompt.
    pub fn names(&self, user_id: &UserId) -> Result<Vec<String>> {
        Ok(self.list(user_id)?.into_iter().map(|c| c.name).collect())
    }

    /// Resolve a free-text name against names and aliases.
    pub fn find_by_name(&self, user_id: &UserId, query: &str) -> Result<Option<Contact>> {
        let contacts = self.list(user_id)?;
        let mut best: Option<(usize, f64)> = None;
        for (idx, contact) in contacts.iter().enumerate() {
            let mut s = fuzzy::score(query, &contact.name);
            for alias in &contact.aliases {
                s = s.max(fuzzy::score(query, alias));
            }
            if s >= fuzzy::SEARCH_THRESHOLD && best.is_none_or(|(_, b)| s > b) {
                best = Some((idx, s));
            }
        }
        Ok(best.map(|(idx, _)| contacts[idx].clone()))
    }

    pub fn delete(&self, contact_id: &str, user_id: &UserId) -> Result<()> {
        let db = self.db.lock().unwrap();
        let deleted = db.execute(
            "DELETE FROM contacts WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![contact_id, user_id.as_str()],
        )?;
        if deleted == 0 {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let aliases: Vec<String> =
        serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
    Ok(Contact {
        id: row.get(0)?,
        user_id: UserId::from(row.get::<_, String>(1)?),
        name: row.get(2)?,
        phone: row.get(3)?,
        aliases,
    })
}
