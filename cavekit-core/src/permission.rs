//! Rank-based permission evaluation.

use cavekit_types::CaveUser;

/// Order used when a deployment does not configure its own.
pub const DEFAULT_LEVEL_ORDER: [&str; 3] = ["anonymous", "user", "admin"];

/// Evaluates a permission expression against a user's level.
///
/// A level's rank is its index in `level_order`; levels not listed rank
/// `-1` and lose every rank comparison. Expressions, checked in this
/// order: `>=X`, `<=X`, `>X`, `<X`, `=X` (exact string), a comma list
/// (exact membership, ranks ignored), and a bare label (exact string).
/// A blank expression accepts everyone. Tokens are trimmed; nothing else
/// is normalized.
pub fn evaluate_permission(
    user: &CaveUser,
    spec: &str,
    level_order: &[impl AsRef<str>],
) -> bool {
    let spec = spec.trim();
    if spec.is_empty() {
        return true;
    }
    let rank = |label: &str| -> i64 {
        level_order
            .iter()
            .position(|l| l.as_ref() == label)
            .map(|i| i as i64)
            .unwrap_or(-1)
    };
    let level = user.permission_level.as_str();
    if let Some(label) = spec.strip_prefix(">=") {
        return rank(level) >= rank(label.trim());
    }
    if let Some(label) = spec.strip_prefix("<=") {
        return rank(level) <= rank(label.trim());
    }
    if let Some(label) = spec.strip_prefix('>') {
        return rank(level) > rank(label.trim());
    }
    if let Some(label) = spec.strip_prefix('<') {
        return rank(level) < rank(label.trim());
    }
    if let Some(label) = spec.strip_prefix('=') {
        return level == label.trim();
    }
    if spec.contains(',') {
        return spec.split(',').map(str::trim).any(|label| label == level);
    }
    level == spec
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(level: &str) -> CaveUser {
        CaveUser::new("u-1", level)
    }

    #[test]
    fn test_blank_spec_accepts_everyone() {
        assert!(evaluate_permission(&user("anonymous"), "", &DEFAULT_LEVEL_ORDER));
        assert!(evaluate_permission(&user("whoever"), "   ", &DEFAULT_LEVEL_ORDER));
    }

    #[test]
    fn test_strictly_above() {
        let spec = ">anonymous";
        assert!(!evaluate_permission(&user("anonymous"), spec, &DEFAULT_LEVEL_ORDER));
        assert!(evaluate_permission(&user("user"), spec, &DEFAULT_LEVEL_ORDER));
        assert!(evaluate_permission(&user("admin"), spec, &DEFAULT_LEVEL_ORDER));
        // Unranked levels lose every rank comparison.
        assert!(!evaluate_permission(&user("stranger"), spec, &DEFAULT_LEVEL_ORDER));
    }

    #[test]
    fn test_at_least() {
        let spec = ">=user";
        assert!(!evaluate_permission(&user("anonymous"), spec, &DEFAULT_LEVEL_ORDER));
        assert!(evaluate_permission(&user("user"), spec, &DEFAULT_LEVEL_ORDER));
        assert!(evaluate_permission(&user("admin"), spec, &DEFAULT_LEVEL_ORDER));
    }

    #[test]
    fn test_below_and_at_most() {
        assert!(evaluate_permission(&user("anonymous"), "<user", &DEFAULT_LEVEL_ORDER));
        assert!(!evaluate_permission(&user("user"), "<user", &DEFAULT_LEVEL_ORDER));
        assert!(evaluate_permission(&user("user"), "<=user", &DEFAULT_LEVEL_ORDER));
        assert!(!evaluate_permission(&user("admin"), "<=user", &DEFAULT_LEVEL_ORDER));
    }

    #[test]
    fn test_exact_match() {
        assert!(evaluate_permission(&user("admin"), "=admin", &DEFAULT_LEVEL_ORDER));
        assert!(!evaluate_permission(&user("user"), "=admin", &DEFAULT_LEVEL_ORDER));
        assert!(evaluate_permission(&user("admin"), "admin", &DEFAULT_LEVEL_ORDER));
        assert!(!evaluate_permission(&user("user"), "admin", &DEFAULT_LEVEL_ORDER));
    }

    #[test]
    fn test_comma_list_is_exact_membership() {
        let spec = "admin, editor";
        assert!(evaluate_permission(&user("admin"), spec, &DEFAULT_LEVEL_ORDER));
        // Membership ignores ranks entirely, so unranked labels work.
        assert!(evaluate_permission(&user("editor"), spec, &DEFAULT_LEVEL_ORDER));
        assert!(!evaluate_permission(&user("user"), spec, &DEFAULT_LEVEL_ORDER));
    }

    #[test]
    fn test_comparisons_against_unranked_labels() {
        // rank("vip") is -1, so any ranked level sits strictly above it.
        assert!(evaluate_permission(&user("anonymous"), ">vip", &DEFAULT_LEVEL_ORDER));
        assert!(!evaluate_permission(&user("anonymous"), "<vip", &DEFAULT_LEVEL_ORDER));
    }

    #[test]
    fn test_custom_level_order() {
        let order = vec![
            "guest".to_string(),
            "member".to_string(),
            "moderator".to_string(),
            "owner".to_string(),
        ];
        assert!(evaluate_permission(&user("moderator"), ">=member", &order));
        assert!(!evaluate_permission(&user("guest"), ">=member", &order));
        assert!(evaluate_permission(&user("owner"), ">moderator", &order));
    }
}
