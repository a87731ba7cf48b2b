// src/middleware.rs
//! Dziennik aktywności CMS.
//!
//! Dla żądań modyfikujących (POST/PUT/PATCH/DELETE) zasób i jego ID są odczytywane ze ścieżki
//! `/api/cms/{zasób}/{id}[/...]`. Przed i po wykonaniu handlera pobierany jest stan wiersza
//! jako JSON, a do `activity_logs` trafia lista zmienionych pól. Zapis kategorii głównej
//! (kaskada statusu, przeniesienie przy usuwaniu) dodaje osobny wpis dla każdej zmienionej
//! podkategorii.
//! Błąd zapisu do dziennika nigdy nie psuje odpowiedzi.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{Method, header},
    middleware::Next,
    response::Response,
};
use serde_json::{Map, Value, json};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::verify_jwt;
use crate::models::Role;
use crate::state::AppState;

const CMS_PREFIX: &str = "/api/cms/";
const MAX_LOGGED_BODY_BYTES: usize = 1024 * 1024;
// Pola zmieniające się przy każdym zapisie, pomijane w różnicy
const IGNORED_FIELDS: &[&str] = &["updated_at"];

/// Zasoby, których zmiany trafiają do dziennika (nazwa w ścieżce = nazwa tabeli)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditedResource {
    Category,
    Product,
}

impl AuditedResource {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "categories" => Some(AuditedResource::Category),
            "products" => Some(AuditedResource::Product),
            _ => None,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            AuditedResource::Category => "categories",
            AuditedResource::Product => "products",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ActivityTarget {
    pub resource: AuditedResource,
    pub resource_id: Option<Uuid>,
}

impl ActivityTarget {
    pub fn from_path(path: &str) -> Option<Self> {
        let rest = path.strip_prefix(CMS_PREFIX)?;
        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        let resource = AuditedResource::from_segment(segments.next()?)?;
        let resource_id = match segments.next() {
            Some(raw) => Some(Uuid::parse_str(raw).ok()?),
            None => None,
        };
        Some(ActivityTarget {
            resource,
            resource_id,
        })
    }
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

pub fn action_name(before: Option<&Value>, after: Option<&Value>) -> &'static str {
    match (before, after) {
        (None, Some(_)) => "create",
        (Some(_), None) => "delete",
        _ => "update",
    }
}

/// Różnica dwóch stanów wiersza: `{pole: {"old": .., "new": ..}}` tylko dla zmienionych pól.
pub fn diff_snapshots(before: Option<&Value>, after: Option<&Value>) -> Value {
    let empty = Map::new();
    let before = before.and_then(Value::as_object).unwrap_or(&empty);
    let after = after.and_then(Value::as_object).unwrap_or(&empty);

    let mut keys: Vec<&String> = before.keys().chain(after.keys()).collect();
    keys.sort();
    keys.dedup();

    let changes: Map<String, Value> = keys
        .into_iter()
        .filter(|key| !IGNORED_FIELDS.contains(&key.as_str()))
        .filter_map(|key| {
            let old = before.get(key).unwrap_or(&Value::Null);
            let new = after.get(key).unwrap_or(&Value::Null);
            (old != new).then(|| (key.clone(), json!({ "old": old, "new": new })))
        })
        .collect();

    Value::Object(changes)
}

async fn snapshot(
    pool: &PgPool,
    resource: AuditedResource,
    id: Uuid,
) -> Result<Option<Value>, sqlx::Error> {
    sqlx::query_scalar::<_, Value>(&format!(
        "SELECT to_jsonb(t) FROM {} t WHERE t.id = $1",
        resource.table()
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Stany podkategorii danej kategorii: zmiana rodzica może przestawić ich status lub rodzica
async fn child_snapshots(
    pool: &PgPool,
    parent_id: Uuid,
) -> Result<Vec<(Uuid, Value)>, sqlx::Error> {
    sqlx::query_as::<_, (Uuid, Value)>(
        "SELECT t.id, to_jsonb(t) FROM categories t WHERE t.parent_id = $1 ORDER BY t.id",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await
}

async fn snapshots_by_id(
    pool: &PgPool,
    resource: AuditedResource,
    ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, Value>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, Value)>(&format!(
        "SELECT t.id, to_jsonb(t) FROM {} t WHERE t.id = ANY($1)",
        resource.table()
    ))
    .bind(ids)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

fn admin_id_from_request(request: &Request, secret: &str) -> Option<Uuid> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;
    let claims = verify_jwt(token, secret).ok()?.claims;
    (claims.role == Role::Admin).then_some(claims.sub)
}

/// ID utworzonego zasobu odczytane z ciała odpowiedzi (pole `id`)
async fn created_id(response: Response) -> (Response, Option<Uuid>) {
    let (parts, body) = response.into_parts();
    match to_bytes(body, MAX_LOGGED_BODY_BYTES).await {
        Ok(bytes) => {
            let id = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_owned))
                .and_then(|raw| Uuid::parse_str(&raw).ok());
            (Response::from_parts(parts, Body::from(bytes)), id)
        }
        Err(e) => {
            tracing::warn!("Nie udało się odczytać odpowiedzi do dziennika: {:?}", e);
            (Response::from_parts(parts, Body::empty()), None)
        }
    }
}

struct ActivityRecord<'a> {
    actor_id: Uuid,
    method: &'a Method,
    path: &'a str,
    resource: AuditedResource,
    resource_id: Option<Uuid>,
    action: &'static str,
    changes: Value,
}

async fn insert_activity(pool: &PgPool, record: ActivityRecord<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO activity_logs (actor_id, method, path, resource, resource_id, action, changes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.actor_id)
    .bind(record.method.as_str())
    .bind(record.path)
    .bind(record.resource.table())
    .bind(record.resource_id)
    .bind(record.action)
    .bind(&record.changes)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn activity_log_middleware(
    State(app_state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    if !is_mutating(&method) {
        return next.run(request).await;
    }
    let Some(target) = ActivityTarget::from_path(&path) else {
        return next.run(request).await;
    };
    // Żądania bez ważnego tokenu administratora i tak zostaną odrzucone przez handler
    let Some(actor_id) = admin_id_from_request(&request, &app_state.jwt_secret) else {
        return next.run(request).await;
    };

    let before = match target.resource_id {
        Some(id) => snapshot(&app_state.db_pool, target.resource, id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Dziennik aktywności: błąd odczytu stanu przed zmianą: {:?}", e);
                None
            }),
        None => None,
    };

    let children_before = match (target.resource, target.resource_id) {
        (AuditedResource::Category, Some(id)) => child_snapshots(&app_state.db_pool, id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Dziennik aktywności: błąd odczytu podkategorii: {:?}", e);
                Vec::new()
            }),
        _ => Vec::new(),
    };

    let mut response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    let resource_id = match target.resource_id {
        Some(id) => Some(id),
        None => {
            let (rebuilt, id) = created_id(response).await;
            response = rebuilt;
            id
        }
    };

    let after = match resource_id {
        Some(id) => snapshot(&app_state.db_pool, target.resource, id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Dziennik aktywności: błąd odczytu stanu po zmianie: {:?}", e);
                None
            }),
        None => None,
    };

    let record = ActivityRecord {
        actor_id,
        method: &method,
        path: &path,
        resource: target.resource,
        resource_id,
        action: action_name(before.as_ref(), after.as_ref()),
        changes: diff_snapshots(before.as_ref(), after.as_ref()),
    };

    if let Err(e) = insert_activity(&app_state.db_pool, record).await {
        tracing::warn!(
            "Nie udało się zapisać dziennika aktywności dla {} {}: {:?}",
            method,
            path,
            e
        );
    } else {
        tracing::debug!("Zapisano aktywność {} {} (admin {})", method, path, actor_id);
    }

    if !children_before.is_empty() {
        record_child_changes(
            &app_state.db_pool,
            actor_id,
            &method,
            &path,
            children_before,
        )
        .await;
    }

    response
}

/// Osobny wpis dla każdej podkategorii zmienionej przy okazji zapisu rodzica
async fn record_child_changes(
    pool: &PgPool,
    actor_id: Uuid,
    method: &Method,
    path: &str,
    children_before: Vec<(Uuid, Value)>,
) {
    let ids = children_before.iter().map(|(id, _)| *id).collect();
    let mut after = match snapshots_by_id(pool, AuditedResource::Category, ids).await {
        Ok(after) => after,
        Err(e) => {
            tracing::warn!("Dziennik aktywności: błąd odczytu podkategorii po zmianie: {:?}", e);
            return;
        }
    };

    for (child_id, before) in children_before {
        let child_after = after.remove(&child_id);
        let changes = diff_snapshots(Some(&before), child_after.as_ref());
        if changes.as_object().is_some_and(Map::is_empty) {
            continue;
        }
        let record = ActivityRecord {
            actor_id,
            method,
            path,
            resource: AuditedResource::Category,
            resource_id: Some(child_id),
            action: action_name(Some(&before), child_after.as_ref()),
            changes,
        };
        if let Err(e) = insert_activity(pool, record).await {
            tracing::warn!(
                "Nie udało się zapisać zmiany podkategorii {} w dzienniku: {:?}",
                child_id,
                e
            );
        }
    }
}
