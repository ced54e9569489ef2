use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use yoman_core::clock::Clock;
use yoman_core::types::{new_row_id, UserId};

use crate::db::{parse_ts, parse_ts_opt, Db};
use crate::error::{DomainError, Result};
use crate::types::{Task, TaskPriority, TaskStatus};

const TASK_COLUMNS: &str =
    "id, user_id, title, description, priority, status, due_ts_utc, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_ts_utc: Option<DateTime<Utc>>,
}

/// Owner of the `tasks` table.
pub struct TaskService {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn create(&self, input: NewTask) -> Result<Task> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(DomainError::EmptyTitle);
        }
        let now = self.clock.now_utc();
        let id = new_row_id();
        {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO tasks
                 (id, user_id, title, description, priority, status, due_ts_utc,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?7)",
                rusqlite::params![
                    id,
                    input.user_id.as_str(),
                    title,
                    input.description,
                    input.priority.as_str(),
                    input.due_ts_utc.map(|t| t.to_rfc3339()),
                    now.to_rfc3339(),
                ],
            )?;
        }
        info!(task_id = %id, user_id = %input.user_id, "task created");
        self.get_by_id(&id, &input.user_id)
    }

    pub fn get_by_id(&self, task_id: &str, user_id: &UserId) -> Result<Task> {
        if Uuid::parse_str(task_id).is_err() {
            return Err(DomainError::NotFound);
        }
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
            rusqlite::params![task_id, user_id.as_str()],
            row_to_task,
        ) {
            Ok(t) => Ok(t),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(DomainError::NotFound),
            Err(e) => Err(DomainError::Database(e)),
        }
    }

    /// Open tasks (pending / in-progress), due-date first, then priority.
    pub fn list_open(&self, user_id: &UserId) -> Result<Vec<Task>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 AND status IN ('pending', 'in_progress')
             ORDER BY due_ts_utc IS NULL, due_ts_utc ASC,
                      CASE priority
                        WHEN 'urgent' THEN 0 WHEN 'high' THEN 1
                        WHEN 'normal' THEN 2 ELSE 3
                      END"
        ))?;
        let tasks = stmt
            .query_map(rusqlite::params![user_id.as_str()], row_to_task)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(tasks)
    }

    pub fn set_status(&self, task_id: &str, user_id: &UserId, status: TaskStatus) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE tasks SET status = ?3, updated_at = ?4
             WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![task_id, user_id.as_str(), status.as_str(), now],
        )?;
        if changed == 0 {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    pub fn delete(&self, task_id: &str, user_id: &UserId) -> Result<()> {
        if Uuid::parse_str(task_id).is_err() {
            return Err(DomainError::NotFound);
        }
        let db = self.db.lock().unwrap();
        let deleted = db.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![task_id, user_id.as_str()],
        )?;
        if deleted == 0 {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    use std::str::FromStr;
    Ok(Task {
        id: row.get(0)?,
        user_id: UserId::from(row.get::<_, String>(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        priority: TaskPriority::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
        status: TaskStatus::from_str(&row.get::<_, String>(5)?).unwrap_or_default(),
        due_ts_utc: parse_ts_opt(row.get(6)?),
        created_at: parse_ts(&row.get::<_, String>(7)?),
        updated_at: parse_ts(&row.get::<_, String>(8)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_shared;
    use rusqlite::Connection;
    use yoman_core::clock::FixedClock;

    fn service() -> TaskService {
        let clock = Arc::new(FixedClock::new("2025-10-10T07:00:00Z".parse().unwrap()));
        let db = open_shared(Connection::open_in_memory().unwrap()).unwrap();
        TaskService::new(db, clock)
    }

    fn uid() -> UserId {
        UserId::from("u-owner")
    }

    #[test]
    fn open_list_orders_by_due_then_priority() {
        let svc = service();
        svc.create(NewTask {
            user_id: uid(),
            title: "בלי תאריך".to_string(),
            description: None,
            priority: TaskPriority::Urgent,
            due_ts_utc: None,
        })
        .unwrap();
        svc.create(NewTask {
            user_id: uid(),
            title: "עם תאריך".to_string(),
            description: None,
            priority: TaskPriority::Low,
            due_ts_utc: Some("2025-10-12T10:00:00Z".parse().unwrap()),
        })
        .unwrap();

        let open = svc.list_open(&uid()).unwrap();
        assert_eq!(open[0].title, "עם תאריך");
        assert_eq!(open[1].title, "בלי תאריך");
    }

    #[test]
    fn completed_tasks_leave_open_list() {
        let svc = service();
        let t = svc
            .create(NewTask {
                user_id: uid(),
                title: "לסיים".to_string(),
                description: None,
                priority: TaskPriority::Normal,
                due_ts_utc: None,
            })
            .unwrap();
        svc.set_status(&t.id, &uid(), TaskStatus::Completed).unwrap();
        assert!(svc.list_open(&uid()).unwrap().is_empty());
    }

    #[test]
    fn ownership_enforced() {
        let svc = service();
        let t = svc
            .create(NewTask {
                user_id: uid(),
                title: "שלי".to_string(),
                description: None,
                priority: TaskPriority::Normal,
                due_ts_utc: None,
            })
            .unwrap();
        let other = UserId::from("u-other");
        assert!(matches!(
            svc.set_status(&t.id, &other, TaskStatus::Completed),
            Err(DomainError::NotFound)
        ));
        assert!(matches!(svc.delete(&t.id, &other), Err(DomainError::NotFound)));
    }
}
