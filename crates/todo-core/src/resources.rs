//! List and task resources
//!
//! Every list and task carries the id of the user that owns it. The API
//! never decides access from anything else: `owner_of` is the single hook
//! the ownership check calls before touching a resource.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{Result, TodoError};

/// A to-do list owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TodoList {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TodoList {
    pub fn new(user_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A task inside a list; `user_id` always equals the owning list's user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub list_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub list_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
}

/// Partial task update
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

/// Reference to an owned resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    List(Uuid),
    Task(Uuid),
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::List(id) => write!(f, "list:{id}"),
            Self::Task(id) => write!(f, "task:{id}"),
        }
    }
}

/// Trait for list and task persistence
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Resolve the owning user of a resource, `None` if it does not exist
    async fn owner_of(&self, resource: ResourceRef) -> Result<Option<Uuid>>;

    async fn create_list(&self, list: TodoList) -> Result<TodoList>;

    async fn get_list(&self, id: Uuid) -> Result<Option<TodoList>>;

    /// Lists owned by a user, oldest first
    async fn lists_for_user(&self, user_id: Uuid) -> Result<Vec<TodoList>>;

    /// Delete a list and every task in it
    async fn delete_list(&self, id: Uuid) -> Result<()>;

    async fn create_task(&self, task: NewTask) -> Result<Task>;

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>>;

    /// Tasks in a list, oldest first
    async fn tasks_for_list(&self, list_id: Uuid) -> Result<Vec<Task>>;

    async fn update_task(&self, id: Uuid, update: TaskUpdate) -> Result<Task>;

    async fn delete_task(&self, id: Uuid) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    lists: HashMap<Uuid, TodoList>,
    tasks: HashMap<Uuid, Task>,
}

/// In-memory resource store for tests and single-process development
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    state: RwLock<MemoryState>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceRepository for MemoryResourceStore {
    async fn owner_of(&self, resource: ResourceRef) -> Result<Option<Uuid>> {
        let state = self.state.read().await;
        Ok(match resource {
            ResourceRef::List(id) => state.lists.get(&id).map(|l| l.user_id),
            ResourceRef::Task(id) => state.tasks.get(&id).map(|t| t.user_id),
        })
    }

    async fn create_list(&self, list: TodoList) -> Result<TodoList> {
        let mut state = self.state.write().await;
        state.lists.insert(list.id, list.clone());
        Ok(list)
    }

    async fn get_list(&self, id: Uuid) -> Result<Option<TodoList>> {
        Ok(self.state.read().await.lists.get(&id).cloned())
    }

    async fn lists_for_user(&self, user_id: Uuid) -> Result<Vec<TodoList>> {
        let state = self.state.read().await;
        let mut lists: Vec<TodoList> = state
            .lists
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        lists.sort_by_key(|l| l.created_at);
        Ok(lists)
    }

    async fn delete_list(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.lists.remove(&id);
        state.tasks.retain(|_, t| t.list_id != id);
        Ok(())
    }

    async fn create_task(&self, task: NewTask) -> Result<Task> {
        let mut state = self.state.write().await;
        if !state.lists.contains_key(&task.list_id) {
            return Err(TodoError::NotFound(format!("list {}", task.list_id)));
        }

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            list_id: task.list_id,
            user_id: task.user_id,
            title: task.title,
            completed: false,
            created_at: now,
            updated_at: now,
        };
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.state.read().await.tasks.get(&id).cloned())
    }

    async fn tasks_for_list(&self, list_id: Uuid) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.list_id == list_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn update_task(&self, id: Uuid, update: TaskUpdate) -> Result<Task> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| TodoError::NotFound(format!("task {id}")))?;

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(completed) = update.completed {
            task.completed = completed;
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn delete_task(&self, id: Uuid) -> Result<()> {
        self.state.write().await.tasks.remove(&id);
        Ok(())
    }
}

// ============================================================================
// PostgreSQL store
// ============================================================================

/// PostgreSQL resource store
pub struct PgResourceStore {
    pool: PgPool,
}

impl PgResourceStore {
    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the list and task tables if they do not exist.
    ///
    /// Requires the `users` table; run the account schema first.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in [
            r#"
            CREATE TABLE IF NOT EXISTS todo_lists (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_todo_lists_user ON todo_lists(user_id)",
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id UUID PRIMARY KEY,
                list_id UUID NOT NULL REFERENCES todo_lists(id) ON DELETE CASCADE,
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                completed BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_tasks_list ON tasks(list_id)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| TodoError::DatabaseError(format!("Failed to create schema: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceRepository for PgResourceStore {
    async fn owner_of(&self, resource: ResourceRef) -> Result<Option<Uuid>> {
        let (query, id) = match resource {
            ResourceRef::List(id) => ("SELECT user_id FROM todo_lists WHERE id = $1", id),
            ResourceRef::Task(id) => ("SELECT user_id FROM tasks WHERE id = $1", id),
        };

        sqlx::query_scalar::<_, Uuid>(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TodoError::DatabaseError(format!("Failed to resolve owner: {e}")))
    }

    async fn create_list(&self, list: TodoList) -> Result<TodoList> {
        sqlx::query_as::<_, TodoList>(
            r#"
            INSERT INTO todo_lists (id, user_id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, name, created_at, updated_at
            "#,
        )
        .bind(list.id)
        .bind(list.user_id)
        .bind(&list.name)
        .bind(list.created_at)
        .bind(list.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TodoError::DatabaseError(format!("Failed to create list: {e}")))
    }

    async fn get_list(&self, id: Uuid) -> Result<Option<TodoList>> {
        sqlx::query_as::<_, TodoList>(
            "SELECT id, user_id, name, created_at, updated_at FROM todo_lists WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TodoError::DatabaseError(format!("Failed to get list: {e}")))
    }

    async fn lists_for_user(&self, user_id: Uuid) -> Result<Vec<TodoList>> {
        sqlx::query_as::<_, TodoList>(
            "SELECT id, user_id, name, created_at, updated_at FROM todo_lists WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TodoError::DatabaseError(format!("Failed to list lists: {e}")))
    }

    async fn delete_list(&self, id: Uuid) -> Result<()> {
        // tasks go with the list via ON DELETE CASCADE
        sqlx::query("DELETE FROM todo_lists WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| TodoError::DatabaseError(format!("Failed to delete list: {e}")))?;
        Ok(())
    }

    async fn create_task(&self, task: NewTask) -> Result<Task> {
        let now = Utc::now();
        sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (id, list_id, user_id, title, completed, created_at, updated_at)
            VALUES ($1, $2, $3, $4, FALSE, $5, $5)
            RETURNING id, list_id, user_id, title, completed, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(task.list_id)
        .bind(task.user_id)
        .bind(&task.title)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TodoError::DatabaseError(format!("Failed to create task: {e}")))
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        sqlx::query_as::<_, Task>(
            "SELECT id, list_id, user_id, title, completed, created_at, updated_at FROM tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TodoError::DatabaseError(format!("Failed to get task: {e}")))
    }

    async fn tasks_for_list(&self, list_id: Uuid) -> Result<Vec<Task>> {
        sqlx::query_as::<_, Task>(
            "SELECT id, list_id, user_id, title, completed, created_at, updated_at FROM tasks WHERE list_id = $1 ORDER BY created_at",
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TodoError::DatabaseError(format!("Failed to list tasks: {e}")))
    }

    async fn update_task(&self, id: Uuid, update: TaskUpdate) -> Result<Task> {
        sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET title = COALESCE($2, title),
                completed = COALESCE($3, completed),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, list_id, user_id, title, completed, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(update.title)
        .bind(update.completed)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TodoError::DatabaseError(format!("Failed to update task: {e}")))?
        .ok_or_else(|| TodoError::NotFound(format!("task {id}")))
    }

    async fn delete_task(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| TodoError::DatabaseError(format!("Failed to delete task: {e}")))?;
        Ok(())
    }
}
