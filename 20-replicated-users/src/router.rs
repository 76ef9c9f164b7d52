//! Request routing for the `/api/users` resource.
//!
//! [`dispatch`] turns `(method, path, body)` into a [`Reply`] against a
//! [`UserStore`]. It never performs I/O and never fails: every expected problem
//! (bad path, bad id, bad body, unknown user) becomes a status plus a JSON
//! payload. Guards run top to bottom and the first match wins:
//!
//! 1. the path is neither `/api/users` nor `/api/users/{id}` → 400
//! 2. collection: `GET` lists, `POST` validates and creates, anything else → 400
//! 3. item: a malformed id → 404 before the method is looked at, then
//!    `GET`/`PUT`/`DELETE` against the store, anything else → 400

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};
use uuid::{Uuid, Variant};

use crate::error::ApiError;
use crate::store::UserStore;
use crate::user::{UserDraft, UserPatch};

const API_SEGMENT: &str = "api";
const RESOURCE_SEGMENT: &str = "users";
const HYPHENATED_UUID_LEN: usize = 36;

/// Status and optional JSON body produced by the router.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl Reply {
    fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
        }
    }
}

impl From<ApiError> for Reply {
    fn from(error: ApiError) -> Self {
        Reply::json(error.status(), error.envelope())
    }
}

/// Shape of a request path once split into segments.
#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Collection,
    Item(&'a str),
    Unknown,
}

impl<'a> Route<'a> {
    /// Accepts `/api/users` and `/api/users/{segment}`, each with at most one
    /// trailing slash. Query strings must already be stripped.
    pub fn parse(path: &'a str) -> Self {
        let Some(rest) = path.strip_prefix('/') else {
            return Route::Unknown;
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        let mut segments = rest.split('/');

        match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(API_SEGMENT), Some(RESOURCE_SEGMENT), None, None) => Route::Collection,
            (Some(API_SEGMENT), Some(RESOURCE_SEGMENT), Some(id), None) if !id.is_empty() => {
                Route::Item(id)
            }
            _ => Route::Unknown,
        }
    }
}

/// Accepts the canonical hyphenated form of an RFC 4122 id with a version
/// from 1 to 8, plus the nil id.
pub fn parse_id(segment: &str) -> Option<Uuid> {
    if segment.len() != HYPHENATED_UUID_LEN {
        return None;
    }
    let id = Uuid::try_parse(segment).ok()?;
    let versioned =
        matches!(id.get_version_num(), 1..=8) && id.get_variant() == Variant::RFC4122;
    (versioned || id.is_nil()).then_some(id)
}

pub fn dispatch(store: &mut UserStore, method: &Method, path: &str, body: &[u8]) -> Reply {
    match Route::parse(path) {
        Route::Collection => dispatch_collection(store, method, body),
        Route::Item(segment) => match parse_id(segment) {
            Some(id) => dispatch_item(store, method, &id, body),
            None => ApiError::InvalidId.into(),
        },
        Route::Unknown => ApiError::BadRoute.into(),
    }
}

fn dispatch_collection(store: &mut UserStore, method: &Method, body: &[u8]) -> Reply {
    match *method {
        Method::GET => Reply::json(StatusCode::OK, json!({ "data": store.list() })),
        Method::POST => create_user(store, body),
        _ => ApiError::BadRoute.into(),
    }
}

fn create_user(store: &mut UserStore, body: &[u8]) -> Reply {
    let Some(body) = parse_body(body) else {
        return ApiError::MissingBody.into();
    };
    let Some(draft) = UserDraft::from_json(&body) else {
        return ApiError::Validation.into();
    };

    store.create(draft);
    Reply::json(StatusCode::CREATED, json!(store.list()))
}

fn dispatch_item(store: &mut UserStore, method: &Method, id: &Uuid, body: &[u8]) -> Reply {
    match *method {
        Method::GET => match store.get(id) {
            Some(user) => Reply::json(StatusCode::OK, json!(user)),
            None => Reply::json(StatusCode::NOT_FOUND, json!([])),
        },
        Method::PUT => {
            if store.get(id).is_none() {
                return ApiError::UserNotFound.into();
            }
            let patch = parse_body(body)
                .map(|body| UserPatch::from_json(&body))
                .unwrap_or_default();
            match store.update(id, patch) {
                Some(user) => Reply::json(StatusCode::OK, json!({ "data": user })),
                None => ApiError::UserNotFound.into(),
            }
        }
        Method::DELETE => {
            if !store.delete(id) {
                return ApiError::UserNotFound.into();
            }
            Reply::no_content()
        }
        _ => ApiError::BadRoute.into(),
    }
}

/// Empty, unparsable and `null` bodies all count as missing.
fn parse_body(body: &[u8]) -> Option<Value> {
    match serde_json::from_slice(body) {
        Ok(Value::Null) | Err(_) => None,
        Ok(value) => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(store: &mut UserStore, method: Method, path: &str, body: &str) -> Reply {
        dispatch(store, &method, path, body.as_bytes())
    }

    fn seeded() -> (UserStore, Uuid) {
        let mut store = UserStore::new();
        let user = store.create(UserDraft {
            username: "a".into(),
            age: 1,
            hobbies: vec!["x".into()],
        });
        (store, user.id)
    }

    #[test]
    fn route_parsing_uses_whole_segments() {
        assert_eq!(Route::parse("/api/users"), Route::Collection);
        assert_eq!(Route::parse("/api/users/"), Route::Collection);
        assert_eq!(Route::parse("/api/users/abc"), Route::Item("abc"));
        assert_eq!(Route::parse("/api/users/abc/"), Route::Item("abc"));
        assert_eq!(Route::parse("/api/usersx"), Route::Unknown);
        assert_eq!(Route::parse("/api/users/abc/def"), Route::Unknown);
        assert_eq!(Route::parse("/api/users//"), Route::Unknown);
        assert_eq!(Route::parse("/api"), Route::Unknown);
        assert_eq!(Route::parse("api/users"), Route::Unknown);
    }

    #[test]
    fn ids_must_be_hyphenated_uuids() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()), Some(id));
        assert_eq!(parse_id(&id.simple().to_string()), None);
        assert_eq!(parse_id("123"), None);
        assert_eq!(parse_id("zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz"), None);
    }

    #[test]
    fn ids_need_a_known_version_and_variant() {
        assert!(parse_id("11111111-1111-4111-8111-111111111111").is_some());
        assert!(parse_id("11111111-1111-1111-a111-111111111111").is_some());
        assert!(parse_id("11111111-1111-8111-B111-111111111111").is_some());
        assert_eq!(parse_id("00000000-0000-0000-0000-000000000000"), Some(Uuid::nil()));

        // Variant nibble outside 8..=b.
        assert_eq!(parse_id("11111111-1111-1111-1111-111111111111"), None);
        assert_eq!(parse_id("11111111-1111-4111-c111-111111111111"), None);
        // Version nibble 0 or 9+.
        assert_eq!(parse_id("11111111-1111-0111-8111-111111111111"), None);
        assert_eq!(parse_id("11111111-1111-9111-8111-111111111111"), None);
    }

    #[test]
    fn unversioned_ids_are_invalid_for_every_item_method() {
        let (mut store, _) = seeded();
        let path = "/api/users/11111111-1111-1111-1111-111111111111";
        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let reply = call(&mut store, method, path, r#"{"age":2}"#);
            assert_eq!(reply, Reply::from(ApiError::InvalidId));
        }
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn unknown_paths_are_bad_requests() {
        let mut store = UserStore::new();
        let reply = call(&mut store, Method::GET, "/api/posts", "");
        assert_eq!(reply, Reply::from(ApiError::BadRoute));
    }

    #[test]
    fn list_wraps_snapshot_in_data() {
        let (mut store, id) = seeded();
        let reply = call(&mut store, Method::GET, "/api/users", "");
        assert_eq!(reply.status, StatusCode::OK);
        let body = reply.body.expect("list body");
        assert_eq!(body["data"][0]["id"], json!(id));
    }

    #[test]
    fn post_without_body_is_bad_request() {
        let mut store = UserStore::new();
        for body in ["", "{not json", "null"] {
            let reply = call(&mut store, Method::POST, "/api/users", body);
            assert_eq!(reply, Reply::from(ApiError::MissingBody), "body {body:?}");
        }
        assert!(store.list().is_empty());
    }

    #[test]
    fn post_with_incomplete_body_is_validation_error() {
        let mut store = UserStore::new();
        let reply = call(&mut store, Method::POST, "/api/users", r#"{"username":"a"}"#);
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body, Some(ApiError::Validation.envelope()));
        assert!(store.list().is_empty());
    }

    #[test]
    fn post_ignores_caller_supplied_id() {
        let mut store = UserStore::new();
        let supplied = Uuid::new_v4();
        let body = json!({ "id": supplied, "username": "a", "age": 1, "hobbies": ["x"] });

        let reply = call(&mut store, Method::POST, "/api/users", &body.to_string());

        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(store.list().len(), 1);
        assert_ne!(store.list()[0].id, supplied);
        assert_eq!(reply.body, Some(json!(store.list())));
    }

    #[test]
    fn collection_rejects_other_methods() {
        let (mut store, _) = seeded();
        for method in [Method::PUT, Method::DELETE, Method::PATCH] {
            let reply = call(&mut store, method, "/api/users", "{}");
            assert_eq!(reply, Reply::from(ApiError::BadRoute));
        }
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn invalid_id_is_checked_before_method() {
        let (mut store, _) = seeded();
        for method in [Method::GET, Method::PUT, Method::DELETE, Method::POST] {
            let reply = call(&mut store, method, "/api/users/not-a-uuid", "");
            assert_eq!(reply, Reply::from(ApiError::InvalidId));
        }
    }

    #[test]
    fn get_unknown_user_is_not_found_with_empty_array() {
        let mut store = UserStore::new();
        let path = format!("/api/users/{}", Uuid::new_v4());
        let reply = call(&mut store, Method::GET, &path, "");
        assert_eq!(reply, Reply::json(StatusCode::NOT_FOUND, json!([])));
    }

    #[test]
    fn put_applies_sparse_patch() {
        let (mut store, id) = seeded();
        let path = format!("/api/users/{id}");

        let reply = call(&mut store, Method::PUT, &path, r#"{"age":2,"id":"other"}"#);

        assert_eq!(reply.status, StatusCode::OK);
        let user = &reply.body.expect("put body")["data"];
        assert_eq!(user["id"], json!(id));
        assert_eq!(user["age"], json!(2));
        assert_eq!(user["username"], json!("a"));
        assert_eq!(user["hobbies"], json!(["x"]));
    }

    #[test]
    fn put_without_body_is_an_empty_patch() {
        let (mut store, id) = seeded();
        let before = store.list().to_vec();

        let reply = call(&mut store, Method::PUT, &format!("/api/users/{id}"), "");

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(store.list(), before.as_slice());
    }

    #[test]
    fn put_and_delete_of_unknown_user_are_bad_requests() {
        let (mut store, _) = seeded();
        let path = format!("/api/users/{}", Uuid::new_v4());

        let put = call(&mut store, Method::PUT, &path, r#"{"age":5}"#);
        let delete = call(&mut store, Method::DELETE, &path, "");

        assert_eq!(put, Reply::from(ApiError::UserNotFound));
        assert_eq!(delete, Reply::from(ApiError::UserNotFound));
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn delete_removes_user_without_body() {
        let (mut store, id) = seeded();
        let reply = call(&mut store, Method::DELETE, &format!("/api/users/{id}"), "");
        assert_eq!(reply, Reply::no_content());
        assert!(store.list().is_empty());
    }

    #[test]
    fn item_rejects_other_methods() {
        let (mut store, id) = seeded();
        let reply = call(&mut store, Method::POST, &format!("/api/users/{id}"), "{}");
        assert_eq!(reply, Reply::from(ApiError::BadRoute));
    }
}
