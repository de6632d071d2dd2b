//! Voter domain record, draft, and patch types.

use serde::{Deserialize, Serialize};

use crate::types::{DocId, Field};

/// Fully materialized, authoritative voter record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterRecord {
    /// Store-assigned document id.
    pub id: DocId,
    /// Opaque display serial from the source roll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Voter name in whichever script it was entered.
    pub name: String,
    /// Free-text sex/age column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    /// Unique uppercase voter identifier.
    pub voter_id: String,
    /// Digits-only mobile number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
}

impl VoterRecord {
    /// Returns the value of an indexed field.
    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::VoterId => &self.voter_id,
            Field::Name => &self.name,
        }
    }
}

/// Insert payload used to create a new [`VoterRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterDraft {
    /// Opaque display serial.
    pub serial: Option<String>,
    /// Voter name.
    pub name: String,
    /// Free-text sex/age column.
    pub sex: Option<String>,
    /// Voter identifier, uppercased on normalization.
    pub voter_id: String,
    /// Mobile number, reduced to digits on normalization.
    pub mobile: Option<String>,
}

impl VoterDraft {
    /// Trims every field, uppercases the voter id, strips non-digits from the
    /// mobile number and drops optional fields that end up empty.
    pub fn normalized(self) -> Self {
        Self {
            serial: non_empty(self.serial.as_deref().map(str::trim)),
            name: self.name.trim().to_string(),
            sex: non_empty(self.sex.as_deref().map(str::trim)),
            voter_id: normalize_voter_id(&self.voter_id),
            mobile: self.mobile.as_deref().and_then(normalize_mobile),
        }
    }
}

/// Sparse patch where each `Some` field overwrites the record value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterPatch {
    /// Optional replacement for the serial.
    pub serial: Option<String>,
    /// Optional replacement for the name.
    pub name: Option<String>,
    /// Optional replacement for sex/age.
    pub sex: Option<String>,
    /// Optional replacement for the voter id.
    pub voter_id: Option<String>,
    /// Optional replacement for the mobile number.
    pub mobile: Option<String>,
}

impl VoterPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies the same normalization as [`VoterDraft::normalized`] to every set field.
    ///
    /// Optional columns patched to an empty string stay `Some("")` so that the
    /// patch clears the stored value.
    pub fn normalized(self) -> Self {
        Self {
            serial: self.serial.map(|v| v.trim().to_string()),
            name: self.name.map(|v| v.trim().to_string()),
            sex: self.sex.map(|v| v.trim().to_string()),
            voter_id: self.voter_id.map(|v| normalize_voter_id(&v)),
            mobile: self.mobile.map(|v| digits_only(&v)),
        }
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut VoterRecord) {
        if let Some(v) = &self.serial {
            rec.serial = non_empty(Some(v));
        }
        if let Some(v) = &self.name {
            rec.name = v.clone();
        }
        if let Some(v) = &self.sex {
            rec.sex = non_empty(Some(v));
        }
        if let Some(v) = &self.voter_id {
            rec.voter_id = v.clone();
        }
        if let Some(v) = &self.mobile {
            rec.mobile = non_empty(Some(v));
        }
    }
}

/// Trims and uppercases a voter id.
pub fn normalize_voter_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Keeps only ASCII digits; `None` when nothing remains.
pub fn normalize_mobile(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    (!digits.is_empty()).then_some(digits)
}

fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn non_empty(v: Option<&str>) -> Option<String> {
    v.filter(|s| !s.is_empty()).map(str::to_string)
}
