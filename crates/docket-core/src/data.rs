//! Typed query and mutation bindings for each resource.
//!
//! Queries pair a key from [`keys`](crate::keys) with an accessor. Mutations
//! pair an accessor with the keys it patches or revalidates.

use std::future::Future;
use std::time::Duration;

use crate::api::{ApiClient, ApiError};
use crate::context::AppContext;
use crate::keys;
use crate::models::{
    Activity, ActivityQuery, CaseDetails, CaseFile, CaseQuery, Client, Deadline, DeadlineQuery,
    Document, DocumentQuery, MarkAsRead, NewCase, NewClient, NewDeadline, NewNote, NewTask, Note,
    NoteQuery, Notification, NotificationQuery, Task, TaskQuery, TaskStatus, UpdateCase,
    UpdateClient, UpdateDeadline, UpdateDocument, UpdateNote, UpdateTask,
};
use crate::query::{Mutation, MutationOptions, QueryClient, QueryHandle, QueryOptions};

/// The unread badge is polled more eagerly than everything else
const UNREAD_COUNT_STALE_TIME: Duration = Duration::from_secs(30);

/// Wrap an accessor call into a fetch function that owns its client.
fn fetcher<T, F, Fut>(api: &ApiClient, f: F) -> impl Fn() -> Fut + Send + Sync + 'static
where
    F: Fn(ApiClient) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    let api = api.clone();
    move || f(api.clone())
}

fn mutation<I, R, F, Fut>(ctx: &AppContext, f: F) -> Mutation<I, R>
where
    I: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(ApiClient, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
{
    let api = ctx.api.clone();
    Mutation::new(&ctx.queries, move |input: I| f(api.clone(), input))
}

// ===== Queries =====

pub fn clients(ctx: &AppContext) -> QueryHandle<Vec<Client>> {
    ctx.queries.query(
        keys::clients(),
        fetcher(&ctx.api, |api| async move { api.fetch_clients().await }),
        QueryOptions::default(),
    )
}

/// Disabled until a real id is known
pub fn client(ctx: &AppContext, id: i64) -> QueryHandle<Client> {
    ctx.queries.query(
        keys::client(id),
        fetcher(&ctx.api, move |api| async move { api.fetch_client(id).await }),
        QueryOptions::enabled(id > 0),
    )
}

pub fn client_cases(ctx: &AppContext, id: i64) -> QueryHandle<Vec<CaseFile>> {
    let query = CaseQuery {
        client_id: Some(id),
        ..CaseQuery::default()
    };
    ctx.queries.query(
        keys::client_cases(id),
        fetcher(&ctx.api, move |api| {
            let query = query.clone();
            async move { api.fetch_cases(&query).await }
        }),
        QueryOptions::enabled(id > 0),
    )
}

pub fn cases(ctx: &AppContext, query: &CaseQuery) -> QueryHandle<Vec<CaseFile>> {
    let query = query.clone();
    ctx.queries.query(
        keys::cases_filtered(&query),
        fetcher(&ctx.api, move |api| {
            let query = query.clone();
            async move { api.fetch_cases(&query).await }
        }),
        QueryOptions::default(),
    )
}

pub fn case(ctx: &AppContext, id: i64) -> QueryHandle<CaseFile> {
    ctx.queries.query(
        keys::case(id),
        fetcher(&ctx.api, move |api| async move { api.fetch_case(id).await }),
        QueryOptions::enabled(id > 0),
    )
}

pub fn case_details(ctx: &AppContext, id: i64) -> QueryHandle<CaseDetails> {
    ctx.queries.query(
        keys::case_details(id),
        fetcher(&ctx.api, move |api| async move { api.fetch_case_details(id).await }),
        QueryOptions::enabled(id > 0),
    )
}

pub fn deadlines(ctx: &AppContext, query: &DeadlineQuery) -> QueryHandle<Vec<Deadline>> {
    let query = query.clone();
    ctx.queries.query(
        keys::deadlines_filtered(&query),
        fetcher(&ctx.api, move |api| {
            let query = query.clone();
            async move { api.fetch_deadlines(&query).await }
        }),
        QueryOptions::default(),
    )
}

pub fn upcoming_deadlines(ctx: &AppContext, days: u32) -> QueryHandle<Vec<Deadline>> {
    deadlines(ctx, &DeadlineQuery::upcoming(days))
}

pub fn tasks(ctx: &AppContext, query: &TaskQuery) -> QueryHandle<Vec<Task>> {
    let query = query.clone();
    ctx.queries.query(
        keys::tasks_filtered(&query),
        fetcher(&ctx.api, move |api| {
            let query = query.clone();
            async move { api.fetch_tasks(&query).await }
        }),
        QueryOptions::default(),
    )
}

pub fn documents(ctx: &AppContext, case_id: i64) -> QueryHandle<Vec<Document>> {
    ctx.queries.query(
        keys::documents(case_id),
        fetcher(&ctx.api, move |api| async move {
            let query = DocumentQuery {
                case_file_id: Some(case_id),
            };
            api.fetch_documents(&query).await
        }),
        QueryOptions::enabled(case_id > 0),
    )
}

pub fn notes(ctx: &AppContext, case_id: i64) -> QueryHandle<Vec<Note>> {
    ctx.queries.query(
        keys::notes(case_id),
        fetcher(&ctx.api, move |api| async move {
            let query = NoteQuery {
                case_file_id: Some(case_id),
            };
            api.fetch_notes(&query).await
        }),
        QueryOptions::enabled(case_id > 0),
    )
}

pub fn notifications(ctx: &AppContext) -> QueryHandle<Vec<Notification>> {
    ctx.queries.query(
        keys::notifications(),
        fetcher(&ctx.api, |api| async move {
            api.fetch_notifications(&NotificationQuery::default()).await
        }),
        QueryOptions::default(),
    )
}

pub fn unread_count(ctx: &AppContext) -> QueryHandle<u64> {
    ctx.queries.query(
        keys::unread_count(),
        fetcher(&ctx.api, |api| async move { api.fetch_unread_count().await }),
        QueryOptions::default().with_stale_time(UNREAD_COUNT_STALE_TIME),
    )
}

pub fn activities(ctx: &AppContext, case_id: i64) -> QueryHandle<Vec<Activity>> {
    ctx.queries.query(
        keys::activities(case_id),
        fetcher(&ctx.api, move |api| async move {
            let query = ActivityQuery {
                case_file_id: Some(case_id),
                limit: None,
            };
            api.fetch_activities(&query).await
        }),
        QueryOptions::enabled(case_id > 0),
    )
}

// ===== Mutations =====

pub fn create_client(ctx: &AppContext) -> Mutation<NewClient, Client> {
    mutation(ctx, |api, payload: NewClient| async move {
        api.create_client(&payload).await
    })
    .with_plan(|_| MutationOptions::new().invalidates(keys::clients()))
}

pub fn update_client(ctx: &AppContext) -> Mutation<(i64, UpdateClient), Client> {
    mutation(ctx, |api, (id, payload): (i64, UpdateClient)| async move {
        api.update_client(id, &payload).await
    })
    .with_plan(|_| MutationOptions::new().invalidates(keys::clients()))
}

pub fn create_case(ctx: &AppContext) -> Mutation<NewCase, CaseFile> {
    mutation(ctx, |api, payload: NewCase| async move {
        api.create_case(&payload).await
    })
    .with_plan(|_| MutationOptions::new().invalidates(keys::cases()))
}

pub fn update_case(ctx: &AppContext) -> Mutation<(i64, UpdateCase), CaseFile> {
    mutation(ctx, |api, (id, payload): (i64, UpdateCase)| async move {
        api.update_case(id, &payload).await
    })
    .with_plan(|(id, _): &(i64, UpdateCase)| {
        MutationOptions::new()
            .invalidates(keys::cases())
            .invalidates(keys::case_details(*id))
    })
}

pub fn create_deadline(ctx: &AppContext) -> Mutation<NewDeadline, Deadline> {
    mutation(ctx, |api, payload: NewDeadline| async move {
        api.create_deadline(&payload).await
    })
    .with_plan(|payload: &NewDeadline| {
        MutationOptions::new()
            .invalidates(keys::deadlines())
            .invalidates(keys::case_details(payload.case_file_id))
    })
}

pub fn update_deadline(ctx: &AppContext) -> Mutation<(i64, UpdateDeadline), Deadline> {
    mutation(ctx, |api, (id, payload): (i64, UpdateDeadline)| async move {
        api.update_deadline(id, &payload).await
    })
    .with_plan(|_| {
        MutationOptions::new()
            .invalidates(keys::deadlines())
            .invalidates(keys::all_case_details())
    })
}

fn mark_completed(deadlines: &[Deadline], id: i64) -> Vec<Deadline> {
    deadlines
        .iter()
        .map(|deadline| Deadline {
            completed: deadline.completed || deadline.id == id,
            ..deadline.clone()
        })
        .collect()
}

/// Complete a deadline, showing it as completed in every cached deadline
/// list and case view until the server answers.
pub fn complete_deadline(ctx: &AppContext) -> Mutation<i64, Deadline> {
    mutation(ctx, |api, id: i64| async move { api.complete_deadline(id).await }).with_plan(
        |id: &i64| {
            let id = *id;
            MutationOptions::new()
                .optimistic(keys::deadlines(), move |list: &Vec<Deadline>| mark_completed(list, id))
                .optimistic(keys::all_case_details(), move |details: &CaseDetails| CaseDetails {
                    deadlines: mark_completed(&details.deadlines, id),
                    ..details.clone()
                })
        },
    )
}

pub fn create_task(ctx: &AppContext) -> Mutation<NewTask, Task> {
    mutation(ctx, |api, payload: NewTask| async move {
        api.create_task(&payload).await
    })
    .with_plan(|payload: &NewTask| {
        MutationOptions::new()
            .invalidates(keys::tasks())
            .invalidates(keys::case_details(payload.case_file_id))
    })
}

pub fn update_task(ctx: &AppContext) -> Mutation<(i64, UpdateTask), Task> {
    mutation(ctx, |api, (id, payload): (i64, UpdateTask)| async move {
        api.update_task(id, &payload).await
    })
    .with_plan(|_| {
        MutationOptions::new()
            .invalidates(keys::tasks())
            .invalidates(keys::all_case_details())
    })
}

fn with_status(tasks: &[Task], id: i64, status: TaskStatus) -> Vec<Task> {
    tasks
        .iter()
        .map(|task| {
            if task.id == id {
                Task {
                    status,
                    ..task.clone()
                }
            } else {
                task.clone()
            }
        })
        .collect()
}

pub fn update_task_status(ctx: &AppContext) -> Mutation<(i64, TaskStatus), Task> {
    mutation(ctx, |api, (id, status): (i64, TaskStatus)| async move {
        api.update_task_status(id, status).await
    })
    .with_plan(|(id, status): &(i64, TaskStatus)| {
        let (id, status) = (*id, *status);
        MutationOptions::new()
            .optimistic(keys::tasks(), move |list: &Vec<Task>| with_status(list, id, status))
            .optimistic(keys::all_case_details(), move |details: &CaseDetails| CaseDetails {
                tasks: with_status(&details.tasks, id, status),
                ..details.clone()
            })
    })
}

pub fn create_note(ctx: &AppContext) -> Mutation<NewNote, Note> {
    mutation(ctx, |api, payload: NewNote| async move {
        api.create_note(&payload).await
    })
    .with_plan(|_| {
        MutationOptions::new()
            .invalidates(keys::all_notes())
            .invalidates(keys::all_activities())
    })
}

pub fn update_note(ctx: &AppContext) -> Mutation<(i64, UpdateNote), Note> {
    mutation(ctx, |api, (id, payload): (i64, UpdateNote)| async move {
        api.update_note(id, &payload).await
    })
    .with_plan(|_| MutationOptions::new().invalidates(keys::all_notes()))
}

pub fn delete_note(ctx: &AppContext) -> Mutation<i64, ()> {
    mutation(ctx, |api, id: i64| async move { api.delete_note(id).await }).with_plan(|id: &i64| {
        let id = *id;
        MutationOptions::new().optimistic(keys::all_notes(), move |list: &Vec<Note>| {
            list.iter().filter(|note| note.id != id).cloned().collect()
        })
    })
}

pub fn update_document(ctx: &AppContext) -> Mutation<(i64, UpdateDocument), Document> {
    mutation(ctx, |api, (id, payload): (i64, UpdateDocument)| async move {
        api.update_document(id, &payload).await
    })
    .with_plan(|_| MutationOptions::new().invalidates(keys::all_documents()))
}

pub fn delete_document(ctx: &AppContext) -> Mutation<i64, ()> {
    mutation(ctx, |api, id: i64| async move { api.delete_document(id).await }).with_plan(
        |id: &i64| {
            let id = *id;
            MutationOptions::new()
                .optimistic(keys::all_documents(), move |list: &Vec<Document>| {
                    list.iter().filter(|doc| doc.id != id).cloned().collect()
                })
                .invalidates(keys::all_activities())
        },
    )
}

fn mark_read(notifications: &[Notification], ids: &[i64]) -> Vec<Notification> {
    notifications
        .iter()
        .map(|n| Notification {
            is_read: n.is_read || ids.contains(&n.id),
            ..n.clone()
        })
        .collect()
}

/// How many of `ids` the cached list still shows as unread. Without a
/// cached list every distinct id is taken as unread.
fn unread_among(queries: &QueryClient, ids: &[i64]) -> u64 {
    match queries.get_query_data::<Vec<Notification>>(&keys::notifications()) {
        Some(list) => list
            .iter()
            .filter(|n| !n.is_read && ids.contains(&n.id))
            .count() as u64,
        None => {
            let mut distinct = ids.to_vec();
            distinct.sort_unstable();
            distinct.dedup();
            distinct.len() as u64
        }
    }
}

pub fn mark_notifications_read(ctx: &AppContext) -> Mutation<Vec<i64>, ()> {
    let queries = ctx.queries.clone();
    mutation(ctx, |api, ids: Vec<i64>| async move {
        api.mark_notifications_read(&MarkAsRead {
            notification_ids: ids,
        })
        .await
    })
    .with_plan(move |ids: &Vec<i64>| {
        let ids = ids.clone();
        let read = unread_among(&queries, &ids);
        MutationOptions::new()
            .optimistic(keys::notifications(), move |list: &Vec<Notification>| mark_read(list, &ids))
            .optimistic(keys::unread_count(), move |count: &u64| count.saturating_sub(read))
    })
}

pub fn mark_all_notifications_read(ctx: &AppContext) -> Mutation<(), ()> {
    mutation(ctx, |api, ()| async move { api.mark_all_notifications_read().await }).with_plan(|_| {
        MutationOptions::new()
            .optimistic(keys::notifications(), |list: &Vec<Notification>| {
                list.iter()
                    .map(|n| Notification {
                        is_read: true,
                        ..n.clone()
                    })
                    .collect()
            })
            .optimistic(keys::unread_count(), |_: &u64| 0)
    })
}

// ============================================================================
// Tests
// ============================================================================
