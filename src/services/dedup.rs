use crate::models::label::{CanonicalRecord, RawLabelRecord};

/// Separator between key components.
const KEY_SEPARATOR: char = '|';

/// Escapes a literal separator (or itself) inside a component.
const KEY_ESCAPE: char = '\\';

/// Canonical identity key for a raw upload, in either naming convention.
pub fn dedup_key(record: &RawLabelRecord) -> String {
    canonical_key(&record.normalize())
}

/// Identity key of a normalized record.
///
/// Mill, heat number, section, grade, bundle number and unit, in that order,
/// trimmed and upper-cased. Date, time and weight are left out: they drift
/// between re-reads of the same physical item. Separators and backslashes
/// inside a component are backslash-escaped so components cannot bleed into
/// each other.
pub fn canonical_key(record: &CanonicalRecord) -> String {
    let parts = [
        &record.mill,
        &record.heat_no,
        &record.section,
        &record.grade,
        &record.bundle_no,
        &record.unit,
    ];

    let mut key = String::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        for c in part.trim().chars() {
            if c == KEY_SEPARATOR || c == KEY_ESCAPE {
                key.push(KEY_ESCAPE);
            }
            key.push(c.to_ascii_uppercase());
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawLabelRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_key_component_order() {
        let key = dedup_key(&raw(json!({
            "heat": "C103262",
            "mill": "MM",
            "section": "CHANNEL 75*40*4.8",
            "grade": "IS 2062 EZSOBR",
            "bundle": "1",
            "unit": "MM"
        })));
        assert_eq!(key, "MM|C103262|CHANNEL 75*40*4.8|IS 2062 EZSOBR|1|MM");
    }

    #[test]
    fn test_key_ignores_date_time_weight() {
        let first = dedup_key(&raw(json!({
            "HEAT_NO": "C075400", "MILL": "MM", "SECTION": "TMT BAR 25",
            "GRADE": "IS 1786 FE550D", "BUNDLE_NOS": 6, "UNIT": "SAIL-BSP",
            "DATE1": "04-MAR-24", "TIME1": "14:21", "WEIGHT": "2.1"
        })));
        let reread = dedup_key(&raw(json!({
            "HEAT_NO": "C075400", "MILL": "MM", "SECTION": "TMT BAR 25",
            "GRADE": "IS 1786 FE550D", "BUNDLE_NOS": 6, "UNIT": "SAIL-BSP",
            "DATE1": "05-MAR-24", "TIME1": "09:02", "WEIGHT": "2.2"
        })));
        assert_eq!(first, reread);
    }

    #[test]
    fn test_key_same_across_naming_conventions() {
        let legacy = dedup_key(&raw(json!({
            "HEAT_NO": "c075400", "MILL": "MM", "SECTION": "TMT BAR 25",
            "GRADE": "IS 1786 FE550D", "BUNDLE_NOS": 6, "UNIT": "SAIL-BSP"
        })));
        let normalized = dedup_key(&raw(json!({
            "heat_no": "C075400 ", "mill": "mm", "section": "TMT BAR 25",
            "grade": "IS 1786 FE550D", "bundle_no": "6", "unit": "SAIL-BSP"
        })));
        assert_eq!(legacy, normalized);
    }

    #[test]
    fn test_key_distinguishes_bundles() {
        let a = dedup_key(&raw(json!({ "heat_no": "H1", "bundle_no": "1" })));
        let b = dedup_key(&raw(json!({ "heat_no": "H1", "bundle_no": "2" })));
        assert_ne!(a, b);
    }

    #[test]
    fn test_separator_inside_component_is_escaped() {
        let a = dedup_key(&raw(json!({
            "heat_no": "H1", "mill": "MM", "section": "ANGLE|65", "grade": "E250", "bundle_no": "1"
        })));
        let b = dedup_key(&raw(json!({
            "heat_no": "H1", "mill": "MM", "section": "ANGLE", "grade": "65|E250", "bundle_no": "1"
        })));
        assert_ne!(a, b);
        assert_eq!(a, "MM|H1|ANGLE\\|65|E250|1|");
    }

    #[test]
    fn test_backslash_cannot_forge_separator() {
        let a = dedup_key(&raw(json!({ "heat_no": "H1\\", "section": "X" })));
        let b = dedup_key(&raw(json!({ "heat_no": "H1", "section": "\\|X" })));
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_record_still_has_key() {
        let key = dedup_key(&raw(json!({})));
        assert_eq!(key, "|||||");
    }
}
