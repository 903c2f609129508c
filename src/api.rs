//! Kanban API calls

use crate::error::{ClientError, Result};
use crate::session_client::{SessionClient, SessionEvent};
use crate::token_store::TokenStore;
use crate::types::*;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

pub const LOGIN_PATH: &str = "api/auth/login/";
pub const REGISTER_PATH: &str = "api/auth/register/";
pub const CURRENT_USER_PATH: &str = "api/auth/me/";
pub const USERS_PATH: &str = "api/auth/all/";
pub const TASKS_PATH: &str = "api/tasks/";
pub const NOTES_PATH: &str = "api/notes/";

fn task_path(id: i64) -> String {
    format!("{TASKS_PATH}{id}/")
}

fn note_path(id: i64) -> String {
    format!("{NOTES_PATH}{id}/")
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    Ok(response.json().await?)
}

impl<S: TokenStore> SessionClient<S> {
    /// Log in and store the issued token pair
    ///
    /// Credentials are posted outside the refresh funnel, so a rejected
    /// login surfaces as [`ClientError::Unauthorized`] without touching the
    /// current session.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };

        let response = self.send_public(LOGIN_PATH, &serde_json::to_value(&request)?).await?;
        let tokens: LoginResponse = decode(response).await?;
        self.token_store().store(tokens.into())?;

        info!(username = %username, "Logged in");
        self.emit(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Create an account; mismatched passwords are rejected before sending
    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        request.validate()?;
        self.send_public(REGISTER_PATH, &serde_json::to_value(request)?).await?;
        info!(username = %request.username, "Registered account");
        Ok(())
    }

    /// Drop the stored session
    pub fn logout(&self) -> Result<()> {
        self.token_store().clear()?;
        info!("Logged out");
        self.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    pub async fn current_user(&self) -> Result<User> {
        decode(self.get(CURRENT_USER_PATH).await?).await
    }

    /// All accounts, for assigning tasks. Only privileged users may list them.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let listing: Listing<User> = decode(self.get(USERS_PATH).await?).await?;
        Ok(listing.into_vec())
    }

    /// Tasks visible to the current user; privileged users see every task
    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let listing: Listing<Task> = decode(self.get(TASKS_PATH).await?).await?;
        Ok(listing.into_vec())
    }

    pub async fn board(&self) -> Result<Board> {
        Ok(Board::from_tasks(self.list_tasks().await?))
    }

    pub async fn create_task(&self, task: &NewTask) -> Result<Task> {
        if task.title.trim().is_empty() {
            return Err(ClientError::Validation("task title is required".to_string()));
        }
        decode(self.post(TASKS_PATH, &to_body(task)?).await?).await
    }

    pub async fn update_task_status(&self, id: i64, status: TaskStatus) -> Result<Task> {
        let patch = TaskStatusPatch { status };
        decode(self.patch(&task_path(id), &to_body(&patch)?).await?).await
    }

    /// Move a task to the next column, wrapping Done back to To Do
    ///
    /// Local notes and owner win over the server's answer, which may omit
    /// them or render the owner differently.
    pub async fn advance_task(&self, task: &Task) -> Result<Task> {
        let mut updated = self.update_task_status(task.id, task.status.next()).await?;
        if !task.notes.is_empty() {
            updated.notes = task.notes.clone();
        }
        if task.user.is_some() {
            updated.user = task.user.clone();
        }
        Ok(updated)
    }

    pub async fn delete_task(&self, id: i64) -> Result<()> {
        self.delete(&task_path(id)).await?;
        Ok(())
    }

    /// Create the task's note, or overwrite it if one exists
    pub async fn save_note(&self, task: &Task, content: &str) -> Result<Note> {
        if content.trim().is_empty() {
            return Err(ClientError::Validation("note content is required".to_string()));
        }

        let response = match task.note() {
            Some(note) => {
                let patch = NoteContentPatch {
                    content: content.to_string(),
                };
                self.patch(&note_path(note.id), &to_body(&patch)?).await?
            }
            None => {
                let note = NewNote {
                    task: task.id,
                    title: format!("Note for {}", task.title),
                    content: content.to_string(),
                };
                self.post(NOTES_PATH, &to_body(&note)?).await?
            }
        };

        decode(response).await
    }

    pub async fn delete_note(&self, id: i64) -> Result<()> {
        self.delete(&note_path(id)).await?;
        Ok(())
    }
}

fn to_body<T: Serialize>(payload: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(payload)?)
}
