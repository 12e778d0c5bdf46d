use serde::{Deserialize, Serialize};

/// A `(subject, property, object)` membership assertion produced by a
/// container resource. All three terms are URI strings.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MembershipTriple {
    pub subject: String,
    pub property: String,
    pub object: String,
}

impl MembershipTriple {
    pub fn new(
        subject: impl Into<String>,
        property: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            property: property.into(),
            object: object.into(),
        }
    }
}
