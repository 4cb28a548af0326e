use std::fmt;

use mongodb::bson::oid::ObjectId;
use serde::{Serialize, Serializer};

use crate::errors::MetricsError;

/// Learner identifier that passed the format check.
///
/// Learners are addressed by their 24-character hex document id. Only the
/// shape is checked here; whether the learner exists is the attempt source's
/// concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LearnerId {
    oid: ObjectId,
    hex: String,
}

impl LearnerId {
    pub fn parse(value: &str) -> Result<Self, MetricsError> {
        let oid = ObjectId::parse_str(value)
            .map_err(|_| MetricsError::InvalidIdentifier(value.to_string()))?;
        Ok(Self::from_object_id(oid))
    }

    pub fn from_object_id(oid: ObjectId) -> Self {
        Self {
            hex: oid.to_hex(),
            oid,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.hex
    }

    pub fn object_id(&self) -> ObjectId {
        self.oid
    }
}

impl fmt::Display for LearnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

impl Serialize for LearnerId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.hex)
    }
}
