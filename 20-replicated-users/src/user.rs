//! The single record type held by the store, plus the two shapes a request
//! body can take on its way in: a validated draft for creation and a sparse
//! patch for updates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub age: i64,
    pub hobbies: Vec<String>,
}

impl User {
    pub(crate) fn mint(draft: UserDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: draft.username,
            age: draft.age,
            hobbies: draft.hobbies,
        }
    }

    /// Overwrites the fields carried by `patch`; `id` is never touched.
    pub fn apply(&mut self, patch: UserPatch) {
        if let Some(username) = patch.username {
            self.username = username;
        }
        if let Some(age) = patch.age {
            self.age = age;
        }
        if let Some(hobbies) = patch.hobbies {
            self.hobbies = hobbies;
        }
    }
}

/// Everything a new user needs except its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDraft {
    pub username: String,
    pub age: i64,
    pub hobbies: Vec<String>,
}

impl UserDraft {
    /// Checks a parsed POST body. All three fields must be present, typed, and
    /// truthy (`username` non-empty, `age` non-zero); `hobbies` may be an empty
    /// list. Any other key, `id` included, is ignored.
    pub fn from_json(body: &Value) -> Option<Self> {
        let fields = body.as_object()?;
        Some(Self {
            username: username_field(fields)?,
            age: age_field(fields)?,
            hobbies: hobbies_field(fields)?,
        })
    }
}

/// Sparse update: `None` leaves the stored field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub username: Option<String>,
    pub age: Option<i64>,
    pub hobbies: Option<Vec<String>>,
}

impl UserPatch {
    /// Keeps only the fields that are present, correctly typed and truthy.
    /// Anything that is not a JSON object becomes an empty patch.
    pub fn from_json(body: &Value) -> Self {
        let Some(fields) = body.as_object() else {
            return Self::default();
        };
        Self {
            username: username_field(fields),
            age: age_field(fields),
            hobbies: hobbies_field(fields),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.age.is_none() && self.hobbies.is_none()
    }
}

fn username_field(fields: &Map<String, Value>) -> Option<String> {
    match fields.get("username")? {
        Value::String(username) if !username.is_empty() => Some(username.clone()),
        _ => None,
    }
}

fn age_field(fields: &Map<String, Value>) -> Option<i64> {
    let age = fields.get("age")?.as_i64()?;
    (age != 0).then_some(age)
}

fn hobbies_field(fields: &Map<String, Value>) -> Option<Vec<String>> {
    fields
        .get("hobbies")?
        .as_array()?
        .iter()
        .map(|hobby| hobby.as_str().map(str::to_owned))
        .collect()
}
