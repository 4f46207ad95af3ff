//! Tests for the error taxonomy and fingerprinting

use super::*;

mod fingerprint_tests {
    use super::*;

    #[test]
    fn test_stable_across_formatting() {
        let a = sql_fingerprint("SELECT * FROM users WHERE id = 1");
        let b = sql_fingerprint("select *\n  from users\twhere id = 1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_statements_differ() {
        let a = sql_fingerprint("SELECT * FROM users");
        let b = sql_fingerprint("SELECT * FROM orders");
        assert_ne!(a, b);
    }

    #[test]
    fn test_length_and_charset() {
        let fp = sql_fingerprint("SELECT 1");
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

mod taxonomy_tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let err = AdvisorError::UnparseableStatement {
            fingerprint: "ab".into(),
            reason: "bad".into(),
        };
        assert_eq!(err.stage(), "analyser");

        let err = AdvisorError::PlanUnparseable {
            fingerprint: "ab".into(),
            reason: "no Plan".into(),
        };
        assert_eq!(err.stage(), "inspector");

        assert_eq!(
            AdvisorError::ConnectionFailure("down".into()).stage(),
            "gateway"
        );
    }

    #[test]
    fn test_only_connection_failures_are_transient() {
        assert!(AdvisorError::ConnectionFailure("reset".into()).is_transient());
        assert!(!AdvisorError::Cancelled.is_transient());
        assert!(!AdvisorError::ExplainTimeout {
            fingerprint: "ab".into(),
            timeout_ms: 30_000,
        }
        .is_transient());
    }

    #[test]
    fn test_display_carries_context() {
        let err = AdvisorError::ExplainTimeout {
            fingerprint: "deadbeef".into(),
            timeout_ms: 1_500,
        };
        let msg = err.to_string();
        assert!(msg.contains("1500 ms"));
        assert!(msg.contains("deadbeef"));
    }
}
