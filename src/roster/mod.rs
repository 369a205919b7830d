//! The user roster: a CSV record set and its pure in-memory operations.
//!
//! Every operation here is a transform on a parsed copy of the stored
//! document; durability happens only through the document store. The
//! serialization is deliberately plain CSV with no quoting or escaping
//! (the stored format predates this service), so the validation layer
//! must reject field values containing the delimiter.

use serde::Serialize;

/// Schema tag, always row 0 of the stored document.
pub const USERS_HEADER: &str = "FirstName,LastName,Email,PasswordHash,Role";

/// Field delimiter of the stored document. Fields must never contain it.
pub const FIELD_DELIMITER: char = ',';

const FIELD_COUNT: usize = 5;

/// Access roles, ordered from most to least privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Manager,
    Author,
}

impl Role {
    /// Parse a stored or user-supplied role. Anything unrecognized
    /// normalizes to `Author`, the default grant.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "Admin" => Self::Admin,
            "Manager" => Self::Manager,
            _ => Self::Author,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Manager => "Manager",
            Self::Author => "Author",
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// One registered user, one row of the stored document.
///
/// `role` keeps the stored string verbatim for round-tripping;
/// [`UserRecord::role`] gives the normalized view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

impl UserRecord {
    pub fn new(first_name: &str, last_name: &str, email: &str, password_hash: &str, role: Role) -> Self {
        Self {
            first_name: first_name.trim().to_owned(),
            last_name: last_name.trim().to_owned(),
            email: email.trim().to_owned(),
            password_hash: password_hash.to_owned(),
            role: role.as_str().to_owned(),
        }
    }

    /// Normalized role; blank or unknown stored values become Author.
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    fn from_fields(mut fields: Vec<String>) -> Self {
        fields.resize(FIELD_COUNT, String::new());
        let mut it = fields.into_iter();
        Self {
            first_name: it.next().unwrap_or_default(),
            last_name: it.next().unwrap_or_default(),
            email: it.next().unwrap_or_default(),
            password_hash: it.next().unwrap_or_default(),
            role: it.next().unwrap_or_default(),
        }
    }

    fn matches_email(&self, normalized: &str) -> bool {
        !self.email.is_empty() && self.email.trim().eq_ignore_ascii_case(normalized)
    }

    fn to_line(&self) -> String {
        [
            self.first_name.as_str(),
            self.last_name.as_str(),
            self.email.as_str(),
            self.password_hash.as_str(),
            self.role.as_str(),
        ]
        .join(",")
    }
}

/// Partial update applied to every row matching a target email.
/// The password hash is never part of an update.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// JSON-facing view of a record. Never carries the password hash.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
}

/// The decoded record set: header row plus insertion-ordered records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    header: String,
    records: Vec<UserRecord>,
}

impl Roster {
    /// Empty record set under the canonical header.
    pub fn empty() -> Self {
        Self {
            header: USERS_HEADER.to_owned(),
            records: Vec::new(),
        }
    }

    /// Decode a stored document. The first non-empty line is preserved
    /// verbatim as the header; blank and all-empty rows are skipped.
    /// Empty or malformed input yields a header-only set.
    pub fn parse(document: &str) -> Self {
        let mut lines = document
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty());

        let Some(header) = lines.next() else {
            return Self::empty();
        };

        let records = lines
            .map(|line| {
                line.split(FIELD_DELIMITER)
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .filter(|fields| fields.iter().any(|f| !f.trim().is_empty()))
            .map(UserRecord::from_fields)
            .collect();

        Self {
            header: header.to_owned(),
            records,
        }
    }

    /// Encode back to the stored document form, the exact inverse of
    /// [`Roster::parse`] for any set this module produced.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.header.len() + self.records.len() * 48);
        out.push_str(&self.header);
        for record in &self.records {
            out.push('\n');
            out.push_str(&record.to_line());
        }
        out.push('\n');
        out
    }

    pub fn records(&self) -> &[UserRecord] {
        &self.records
    }

    /// First record matching `email`, compared case-insensitively.
    /// Duplicates are not rejected; the first match wins.
    pub fn find_by_email(&self, email: &str) -> Option<&UserRecord> {
        let normalized = email.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return None;
        }
        self.records
            .iter()
            .find(|record| record.matches_email(&normalized))
    }

    /// Append a record. Uniqueness is the caller's responsibility
    /// (check [`Roster::find_by_email`] first).
    pub fn insert(&mut self, record: UserRecord) {
        self.records.push(record);
    }

    /// Apply `updates` to every row matching `target_email`. Fields not
    /// present in the update retain their prior values; the password
    /// hash is never touched; provided roles are normalized and a blank
    /// stored role is repaired to Author. Returns whether any row
    /// matched (identity no-op otherwise).
    pub fn update(&mut self, target_email: &str, updates: &UserUpdate) -> bool {
        let normalized = target_email.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return false;
        }

        let mut touched = false;
        for record in &mut self.records {
            if !record.matches_email(&normalized) {
                continue;
            }
            touched = true;
            if let Some(first_name) = &updates.first_name {
                record.first_name = first_name.trim().to_owned();
            }
            if let Some(last_name) = &updates.last_name {
                record.last_name = last_name.trim().to_owned();
            }
            if let Some(email) = &updates.email {
                record.email = email.trim().to_owned();
            }
            if let Some(role) = &updates.role {
                record.role = Role::parse(role).as_str().to_owned();
            } else if record.role.trim().is_empty() {
                record.role = Role::Author.as_str().to_owned();
            }
        }
        touched
    }

    /// Remove every row matching `target_email` (expected zero or one).
    /// The header is never removed. Returns whether anything was removed.
    pub fn delete(&mut self, target_email: &str) -> bool {
        let normalized = target_email.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return false;
        }
        let before = self.records.len();
        self.records.retain(|record| !record.matches_email(&normalized));
        self.records.len() != before
    }

    /// Hash-free views of every record, roles normalized for display.
    pub fn summaries(&self) -> Vec<UserSummary> {
        self.records
            .iter()
            .map(|record| UserSummary {
                first_name: record.first_name.clone(),
                last_name: record.last_name.clone(),
                email: record.email.clone(),
                role: record.role().as_str().to_owned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Roster {
        let mut roster = Roster::empty();
        roster.insert(UserRecord::new(
            "Ada",
            "Lovelace",
            "ada@example.com",
            "hash-a",
            Role::Admin,
        ));
        roster.insert(UserRecord::new(
            "Grace",
            "Hopper",
            "grace@example.com",
            "hash-g",
            Role::Author,
        ));
        roster
    }

    #[test]
    fn parse_serialize_round_trip() {
        let roster = sample();
        let doc = roster.serialize();
        let reparsed = Roster::parse(&doc);
        assert_eq!(reparsed, roster);
        assert_eq!(reparsed.serialize(), doc);
    }

    #[test]
    fn serialize_appends_trailing_newline() {
        let doc = sample().serialize();
        assert!(doc.ends_with(".com,hash-g,Author\n"));
        assert_eq!(doc.lines().count(), 3);
    }

    #[test]
    fn parse_preserves_foreign_header_verbatim() {
        let doc = "First,Last,Mail,Secret,Kind\nAda,Lovelace,ada@example.com,h,Admin\n";
        let roster = Roster::parse(doc);
        assert_eq!(roster.serialize(), doc);
    }

    #[test]
    fn parse_empty_input_yields_header_only() {
        for doc in ["", "\n", "   \n\n"] {
            let roster = Roster::parse(doc);
            assert!(roster.records().is_empty());
            assert_eq!(roster.serialize(), format!("{USERS_HEADER}\n"));
        }
    }

    #[test]
    fn parse_skips_blank_and_all_empty_rows() {
        let doc = format!("{USERS_HEADER}\n\n,,,,\nAda,Lovelace,ada@example.com,h,Admin\n");
        let roster = Roster::parse(&doc);
        assert_eq!(roster.records().len(), 1);
    }

    #[test]
    fn parse_pads_short_rows() {
        let doc = format!("{USERS_HEADER}\nAda,Lovelace,ada@example.com\n");
        let roster = Roster::parse(&doc);
        let record = &roster.records()[0];
        assert_eq!(record.email, "ada@example.com");
        assert_eq!(record.password_hash, "");
        assert_eq!(record.role(), Role::Author);
    }

    #[test]
    fn parse_handles_crlf_documents() {
        let doc = format!("{USERS_HEADER}\r\nAda,Lovelace,ada@example.com,h,Admin\r\n");
        let roster = Roster::parse(&doc);
        assert_eq!(roster.records()[0].role, "Admin");
    }

    #[test]
    fn find_by_email_is_case_insensitive() {
        let roster = sample();
        let found = roster.find_by_email("  ADA@Example.COM ").unwrap();
        assert_eq!(found.first_name, "Ada");
        assert!(roster.find_by_email("nobody@example.com").is_none());
        assert!(roster.find_by_email("").is_none());
    }

    #[test]
    fn find_by_email_picks_first_duplicate() {
        let mut roster = sample();
        roster.insert(UserRecord::new(
            "Second",
            "Ada",
            "ada@example.com",
            "hash-2",
            Role::Manager,
        ));
        assert_eq!(roster.find_by_email("ada@example.com").unwrap().first_name, "Ada");
    }

    #[test]
    fn insert_then_find_returns_inserted_record() {
        let mut roster = sample();
        roster.insert(UserRecord::new(
            "Edsger",
            "Dijkstra",
            "edsger@example.com",
            "hash-e",
            Role::Manager,
        ));
        let found = roster.find_by_email("edsger@example.com").unwrap();
        assert_eq!(found.last_name, "Dijkstra");
        assert_eq!(found.role(), Role::Manager);
    }

    #[test]
    fn update_retains_unspecified_fields_and_hash() {
        let mut roster = sample();
        let touched = roster.update(
            "grace@example.com",
            &UserUpdate {
                first_name: Some("  Grace B.  ".into()),
                role: Some("Manager".into()),
                ..UserUpdate::default()
            },
        );
        assert!(touched);

        let record = roster.find_by_email("grace@example.com").unwrap();
        assert_eq!(record.first_name, "Grace B.");
        assert_eq!(record.last_name, "Hopper");
        assert_eq!(record.password_hash, "hash-g");
        assert_eq!(record.role, "Manager");
    }

    #[test]
    fn update_normalizes_bogus_roles_to_author() {
        let mut roster = sample();
        roster.update(
            "ada@example.com",
            &UserUpdate {
                role: Some("Bogus".into()),
                ..UserUpdate::default()
            },
        );
        assert_eq!(roster.find_by_email("ada@example.com").unwrap().role, "Author");
    }

    #[test]
    fn update_repairs_blank_stored_role() {
        let doc = format!("{USERS_HEADER}\nAda,Lovelace,ada@example.com,h,\n");
        let mut roster = Roster::parse(&doc);
        roster.update(
            "ada@example.com",
            &UserUpdate {
                first_name: Some("Ada".into()),
                ..UserUpdate::default()
            },
        );
        assert_eq!(roster.find_by_email("ada@example.com").unwrap().role, "Author");
    }

    #[test]
    fn update_unknown_target_is_identity() {
        let mut roster = sample();
        let before = roster.serialize();
        let touched = roster.update(
            "nobody@example.com",
            &UserUpdate {
                first_name: Some("X".into()),
                ..UserUpdate::default()
            },
        );
        assert!(!touched);
        assert_eq!(roster.serialize(), before);
    }

    #[test]
    fn update_can_change_the_email_key() {
        let mut roster = sample();
        roster.update(
            "grace@example.com",
            &UserUpdate {
                email: Some("hopper@example.com".into()),
                ..UserUpdate::default()
            },
        );
        assert!(roster.find_by_email("grace@example.com").is_none());
        assert!(roster.find_by_email("hopper@example.com").is_some());
    }

    #[test]
    fn delete_removes_target_and_preserves_others() {
        let mut roster = sample();
        assert!(roster.delete("ADA@example.com"));
        assert!(roster.find_by_email("ada@example.com").is_none());
        assert!(roster.find_by_email("grace@example.com").is_some());
        assert!(roster.serialize().starts_with(USERS_HEADER));

        assert!(!roster.delete("ada@example.com"));
    }

    #[test]
    fn delete_removes_every_duplicate() {
        let mut roster = sample();
        roster.insert(UserRecord::new(
            "Dup",
            "Licate",
            "ada@example.com",
            "hash-d",
            Role::Author,
        ));
        assert!(roster.delete("ada@example.com"));
        assert_eq!(roster.records().len(), 1);
    }

    #[test]
    fn summaries_never_carry_hashes_and_normalize_roles() {
        let doc = format!(
            "{USERS_HEADER}\nAda,Lovelace,ada@example.com,hash-a,Admin\nNo,Role,norole@example.com,hash-n,Wizard\n"
        );
        let summaries = Roster::parse(&doc).summaries();
        assert_eq!(summaries[0].role, "Admin");
        assert_eq!(summaries[1].role, "Author");

        let json = serde_json::to_string(&summaries).unwrap();
        assert!(json.contains("\"firstName\":\"Ada\""));
        assert!(!json.contains("hash-a"));
    }

    #[test]
    fn role_parsing_and_rendering() {
        assert_eq!(Role::parse("Admin"), Role::Admin);
        assert_eq!(Role::parse(" Manager "), Role::Manager);
        assert_eq!(Role::parse("Author"), Role::Author);
        assert_eq!(Role::parse("wizard"), Role::Author);
        assert_eq!(Role::parse(""), Role::Author);
        assert!(Role::Admin.is_admin());
        assert!(!Role::Manager.is_admin());
    }
}
