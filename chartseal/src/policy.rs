//! Per-entity storage policy tables.
//!
//! Every sensitive attribute is mapped to one of three storage strategies,
//! a value shape, and a normalization rule. Column naming follows a fixed
//! convention: the legacy column keeps the field's own name, the surrogate
//! lives in `{field}Hash`, and the recoverable token in `{field}Encrypted`.

/// Storage strategy for a sensitive field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Surrogate for lookup/uniqueness plus recoverable token for display.
    EncryptAndHash,
    /// Recoverable token only; the field is never searched by equality.
    EncryptOnly,
    /// Surrogate only; closed-enumeration values filtered without decryption.
    HashOnly,
}

impl FieldPolicy {
    /// Whether this policy writes a surrogate column.
    #[must_use]
    pub const fn writes_surrogate(self) -> bool {
        matches!(self, Self::EncryptAndHash | Self::HashOnly)
    }

    /// Whether this policy writes a recoverable-token column.
    #[must_use]
    pub const fn writes_recoverable(self) -> bool {
        matches!(self, Self::EncryptAndHash | Self::EncryptOnly)
    }
}

/// Value shape of a field, driving structured-decode fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain text.
    Text,
    /// Arbitrary JSON structure; decode failure falls back to `{}`.
    Json,
    /// JSON list; decode failure falls back to `[]`.
    JsonList,
}

/// Normalization applied to text values before hashing and sealing.
///
/// Applied identically at write time and query time so representation
/// drift (casing, stray whitespace) collides at the surrogate layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalize {
    /// Use the value exactly as given.
    Exact,
    /// Trim surrounding whitespace.
    Trim,
    /// Trim and lowercase.
    TrimLower,
    /// Trim and uppercase.
    TrimUpper,
}

impl Normalize {
    /// Applies the rule to a raw string.
    #[must_use]
    pub fn apply(self, raw: &str) -> String {
        match self {
            Self::Exact => raw.to_string(),
            Self::Trim => raw.trim().to_string(),
            Self::TrimLower => raw.trim().to_lowercase(),
            Self::TrimUpper => raw.trim().to_uppercase(),
        }
    }
}

/// Policy entry for one sensitive field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field (and legacy column) name.
    pub name: &'static str,
    /// Storage strategy.
    pub policy: FieldPolicy,
    /// Value shape.
    pub kind: FieldKind,
    /// Text normalization rule.
    pub normalize: Normalize,
}

impl FieldSpec {
    /// Creates a text field spec with plain trimming.
    #[must_use]
    pub const fn new(name: &'static str, policy: FieldPolicy) -> Self {
        Self { name, policy, kind: FieldKind::Text, normalize: Normalize::Trim }
    }

    /// Sets the value shape.
    #[must_use]
    pub const fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the normalization rule.
    #[must_use]
    pub const fn with_normalize(mut self, normalize: Normalize) -> Self {
        self.normalize = normalize;
        self
    }

    /// Legacy column name (the field's own name).
    #[must_use]
    pub const fn legacy_column(&self) -> &'static str {
        self.name
    }

    /// Surrogate column name.
    #[must_use]
    pub fn surrogate_column(&self) -> String {
        format!("{}Hash", self.name)
    }

    /// Recoverable-token column name.
    #[must_use]
    pub fn recoverable_column(&self) -> String {
        format!("{}Encrypted", self.name)
    }
}

/// The fixed policy table for one entity type.
#[derive(Debug, Clone, Copy)]
pub struct PolicyTable {
    /// Collection the entity is stored in.
    pub collection: &'static str,
    /// Policy entries, one per sensitive field.
    pub fields: &'static [FieldSpec],
}

impl PolicyTable {
    /// Looks up the spec for a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }
}

/// The hospital-identifier spec, shared by the user and patient tables.
/// Trim-and-uppercase normalization makes casing drift collide at the
/// surrogate layer.
pub const HOSPITAL_ID: FieldSpec =
    FieldSpec::new("HospitalID", FieldPolicy::EncryptAndHash).with_normalize(Normalize::TrimUpper);

/// Account profiles: identifiers, names, contact info, role.
pub const USERS: PolicyTable = PolicyTable {
    collection: "users",
    fields: &[
        HOSPITAL_ID,
        FieldSpec::new("name", FieldPolicy::EncryptAndHash),
        FieldSpec::new("email", FieldPolicy::EncryptAndHash).with_normalize(Normalize::TrimLower),
        FieldSpec::new("phoneNumber", FieldPolicy::EncryptAndHash),
        FieldSpec::new("role", FieldPolicy::EncryptAndHash).with_normalize(Normalize::TrimLower),
    ],
};

/// Patient charts: identifier link plus free-form medical content.
pub const PATIENTS: PolicyTable = PolicyTable {
    collection: "patients",
    fields: &[
        HOSPITAL_ID,
        FieldSpec::new("bloodType", FieldPolicy::EncryptOnly).with_normalize(Normalize::TrimUpper),
        FieldSpec::new("medicalHistory", FieldPolicy::EncryptOnly).with_kind(FieldKind::JsonList),
        FieldSpec::new("aiSummary", FieldPolicy::EncryptOnly).with_normalize(Normalize::Exact),
    ],
};

/// Audit entries: every attribute dual-represented, the actor role kept as
/// a filter-only surrogate.
pub const ACTIVITY_LOGS: PolicyTable = PolicyTable {
    collection: "activity_logs",
    fields: &[
        FieldSpec::new("action", FieldPolicy::EncryptAndHash),
        FieldSpec::new("userHospitalID", FieldPolicy::EncryptAndHash)
            .with_normalize(Normalize::TrimUpper),
        FieldSpec::new("userRole", FieldPolicy::HashOnly).with_normalize(Normalize::TrimLower),
        FieldSpec::new("details", FieldPolicy::EncryptAndHash).with_kind(FieldKind::Json),
        FieldSpec::new("ip", FieldPolicy::EncryptAndHash),
        FieldSpec::new("signature", FieldPolicy::EncryptAndHash).with_normalize(Normalize::Exact),
    ],
};
