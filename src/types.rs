//! Type definitions for authentication and the Kanban API

use crate::error::{ClientError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authentication tokens (access + refresh)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
}

impl From<LoginResponse> for AuthTokens {
    fn from(response: LoginResponse) -> Self {
        Self::new(response.access, response.refresh)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

/// Account registration payload
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    /// Confirmation, must equal `password`
    pub password2: String,
}

impl RegisterRequest {
    /// Checks that can be made before contacting the server
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(ClientError::Validation("username is required".to_string()));
        }
        if self.password != self.password2 {
            return Err(ClientError::Validation("passwords do not match".to_string()));
        }
        Ok(())
    }
}

/// A backend user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

impl User {
    /// Staff and superusers may assign tasks to other accounts
    pub fn is_privileged(&self) -> bool {
        self.is_staff || self.is_superuser
    }
}

/// List endpoints answer with either a bare array or a paginated page
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Plain(Vec<T>),
    Paged { results: Vec<T> },
}

impl<T> Listing<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Paged { results } => results,
            Listing::Plain(items) => items,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

    /// Next column on the board; Done wraps back to Todo
    pub fn next(self) -> Self {
        match self {
            TaskStatus::Todo => TaskStatus::InProgress,
            TaskStatus::InProgress => TaskStatus::Done,
            TaskStatus::Done => TaskStatus::Todo,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Todo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
        }
    }
}

/// Free-text note attached to a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    #[serde(default)]
    pub task: Option<i64>,
    #[serde(default)]
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<TaskOwner>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

/// Account a task belongs to, as the server chose to render it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskOwner {
    Id(i64),
    Name(String),
    User(User),
}

impl TaskOwner {
    pub fn id(&self) -> Option<i64> {
        match self {
            TaskOwner::Id(id) => Some(*id),
            TaskOwner::Name(_) => None,
            TaskOwner::User(user) => user.id,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            TaskOwner::Id(_) => None,
            TaskOwner::Name(name) => Some(name),
            TaskOwner::User(user) => Some(&user.username),
        }
    }
}

impl Task {
    /// A task carries at most one note; the first one wins
    pub fn note(&self) -> Option<&Note> {
        self.notes.first()
    }
}

/// Payload for creating a task
#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub title: String,
    pub status: TaskStatus,
    /// Assignee, honoured by the server for privileged users only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<i64>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: TaskStatus::Todo,
            user: None,
        }
    }

    pub fn assigned_to(mut self, user_id: i64) -> Self {
        self.user = Some(user_id);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TaskStatusPatch {
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewNote {
    pub task: i64,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct NoteContentPatch {
    pub content: String,
}

/// Tasks grouped into the three board columns, in server order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Board {
    pub todo: Vec<Task>,
    pub in_progress: Vec<Task>,
    pub done: Vec<Task>,
}

impl Board {
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut board = Board::default();
        for task in tasks {
            match task.status {
                TaskStatus::Todo => board.todo.push(task),
                TaskStatus::InProgress => board.in_progress.push(task),
                TaskStatus::Done => board.done.push(task),
            }
        }
        board
    }

    pub fn column(&self, status: TaskStatus) -> &[Task] {
        match status {
            TaskStatus::Todo => &self.todo,
            TaskStatus::InProgress => &self.in_progress,
            TaskStatus::Done => &self.done,
        }
    }

    pub fn len(&self) -> usize {
        self.todo.len() + self.in_progress.len() + self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(id: i64, status: &str) -> Task {
        serde_json::from_value(json!({
            "id": id,
            "title": format!("task {id}"),
            "status": status,
            "created_at": "2025-03-01T09:30:00Z",
            "updated_at": "2025-03-01T09:30:00.123456Z",
            "user": 2,
            "notes": []
        }))
        .unwrap()
    }

    #[test]
    fn test_status_cycle_wraps() {
        assert_eq!(TaskStatus::Todo.next(), TaskStatus::InProgress);
        assert_eq!(TaskStatus::InProgress.next(), TaskStatus::Done);
        assert_eq!(TaskStatus::Done.next(), TaskStatus::Todo);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(TaskStatus::InProgress).unwrap(), json!("IN_PROGRESS"));
        let status: TaskStatus = serde_json::from_value(json!("DONE")).unwrap();
        assert_eq!(status, TaskStatus::Done);
    }

    #[test]
    fn test_listing_accepts_both_shapes() {
        let plain: Listing<User> =
            serde_json::from_value(json!([{"username": "ada"}])).unwrap();
        assert_eq!(plain.into_vec().len(), 1);

        let paged: Listing<User> = serde_json::from_value(json!({
            "count": 2,
            "next": null,
            "results": [{"username": "ada"}, {"username": "grace", "is_staff": true}]
        }))
        .unwrap();
        let users = paged.into_vec();
        assert_eq!(users.len(), 2);
        assert!(users[1].is_privileged());
        assert!(!users[0].is_privileged());
    }

    #[test]
    fn test_register_validation() {
        let mut request = RegisterRequest {
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            password: "hunter22".to_string(),
            password2: "hunter23".to_string(),
        };
        assert!(matches!(request.validate(), Err(ClientError::Validation(_))));

        request.password2 = "hunter22".to_string();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_task_owner_shapes() {
        let mut raw = serde_json::to_value(task(1, "TODO")).unwrap();
        assert_eq!(task(1, "TODO").user, Some(TaskOwner::Id(2)));

        raw["user"] = json!("ada");
        let by_name: Task = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(by_name.user, Some(TaskOwner::Name("ada".to_string())));
        assert_eq!(by_name.user.unwrap().username(), Some("ada"));

        raw["user"] = json!({"id": 2, "username": "ada", "is_staff": false});
        let nested: Task = serde_json::from_value(raw.clone()).unwrap();
        let owner = nested.user.unwrap();
        assert!(matches!(owner, TaskOwner::User(_)));
        assert_eq!(owner.id(), Some(2));
        assert_eq!(owner.username(), Some("ada"));

        raw["user"] = json!(null);
        let unassigned: Task = serde_json::from_value(raw).unwrap();
        assert!(unassigned.user.is_none());
    }

    #[test]
    fn test_new_task_omits_unassigned_user() {
        let body = serde_json::to_value(NewTask::new("Ship it")).unwrap();
        assert_eq!(body, json!({"title": "Ship it", "status": "TODO"}));

        let body = serde_json::to_value(NewTask::new("Ship it").assigned_to(7)).unwrap();
        assert_eq!(body["user"], json!(7));
    }

    #[test]
    fn test_board_groups_in_order() {
        let board = Board::from_tasks(vec![
            task(1, "DONE"),
            task(2, "TODO"),
            task(3, "IN_PROGRESS"),
            task(4, "TODO"),
        ]);

        let todo: Vec<i64> = board.column(TaskStatus::Todo).iter().map(|t| t.id).collect();
        assert_eq!(todo, vec![2, 4]);
        assert_eq!(board.in_progress[0].id, 3);
        assert_eq!(board.done[0].id, 1);
        assert_eq!(board.len(), 4);
    }
}
