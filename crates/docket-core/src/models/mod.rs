//! Data models for the case-management API.
//!
//! This module contains the typed resources exchanged with the REST API:
//!
//! - `Client`: people and companies the firm represents
//! - `CaseFile`, `CaseDetails`: case files and the aggregated case view
//! - `Deadline`, `Task`: dated work items attached to a case
//! - `Document`, `Note`, `Activity`: case attachments and history
//! - `Notification`: per-user reminders and updates
//! - `User`, `Credentials`, `AuthResponse`: authentication payloads
//!
//! Payloads are camelCase on the wire. Deserializing into these types is the
//! validation step for every response; the caches never see untyped data.

pub mod activity;
pub mod auth;
pub mod case;
pub mod client;
pub mod deadline;
pub mod document;
pub mod note;
pub mod notification;
pub mod task;

pub use activity::{Activity, ActivityQuery, ActivityType};
pub use auth::{AuthResponse, Credentials, User, UserPatch, UserRole};
pub use case::{CaseDetails, CaseFile, CaseQuery, CaseStatus, NewCase, UpdateCase};
pub use client::{Client, NewClient, UpdateClient};
pub use deadline::{Deadline, DeadlineQuery, DeadlineType, NewDeadline, UpdateDeadline};
pub use document::{Document, DocumentCategory, DocumentQuery, NewDocument, UpdateDocument};
pub use note::{NewNote, Note, NoteQuery, UpdateNote};
pub use notification::{MarkAsRead, Notification, NotificationQuery, NotificationType};
pub use task::{NewTask, Task, TaskQuery, TaskStatus, UpdateTask};
