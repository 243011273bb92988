use serde::{Deserialize, Serialize};

/// Which part of the suite a case belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Character,
    Length,
    Format,
}

impl CaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseKind::Character => "character",
            CaseKind::Length => "length",
            CaseKind::Format => "format",
        }
    }
}

/// Structured encodings exercised by the format cases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    Json,
    Base64,
    Hex,
    Utf8,
}

impl PayloadFormat {
    pub const ALL: [PayloadFormat; 4] =
        [PayloadFormat::Json, PayloadFormat::Base64, PayloadFormat::Hex, PayloadFormat::Utf8];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadFormat::Json => "JSON",
            PayloadFormat::Base64 => "Base64",
            PayloadFormat::Hex => "Hex",
            PayloadFormat::Utf8 => "UTF-8",
        }
    }
}

/// How the content of a case is produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayloadRule {
    /// The single character itself.
    Character(char),
    /// Exactly `length` ASCII bytes.
    Fixed { length: usize },
    /// An encoded payload derived from `base_length` filler bytes.
    Format { format: PayloadFormat, base_length: usize },
}

/// One entry of the suite: a label plus the rule generating its payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCase {
    pub label: String,
    pub kind: CaseKind,
    pub rule: PayloadRule,
}

impl TestCase {
    pub fn character(c: char) -> Self {
        let label = if c == ' ' {
            "space".to_string()
        } else {
            c.to_string()
        };
        Self {
            label,
            kind: CaseKind::Character,
            rule: PayloadRule::Character(c),
        }
    }

    pub fn fixed(length: usize) -> Self {
        Self {
            label: length.to_string(),
            kind: CaseKind::Length,
            rule: PayloadRule::Fixed { length },
        }
    }

    pub fn format(format: PayloadFormat, base_length: usize) -> Self {
        Self {
            label: format.as_str().to_string(),
            kind: CaseKind::Format,
            rule: PayloadRule::Format { format, base_length },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_case_kind() {
        assert_eq!(TestCase::character('a').label, "a");
        assert_eq!(TestCase::character(' ').label, "space");
        assert_eq!(TestCase::fixed(1000).label, "1000");
        assert_eq!(TestCase::format(PayloadFormat::Utf8, 100).label, "UTF-8");
    }

    #[test]
    fn rule_round_trips_through_json() {
        let case = TestCase::format(PayloadFormat::Base64, 64);
        let v = serde_json::to_value(&case).unwrap();
        assert_eq!(v["rule"]["format"]["format"], "base64");
        let back: TestCase = serde_json::from_value(v).unwrap();
        assert_eq!(back, case);
    }
}
