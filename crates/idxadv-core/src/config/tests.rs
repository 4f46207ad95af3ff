//! Tests for configuration validation

use super::*;

mod advisor_options_tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let opts = AdvisorOptions::default();
        assert_eq!(opts.pool_min, 2);
        assert_eq!(opts.pool_max, 10);
        assert_eq!(opts.explain_timeout_ms, 30_000);
        assert_eq!(opts.stats_cache_ttl_s, 3_600);
        assert!(opts.covering_enabled);
        assert!(opts.partial_enabled);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_pool_bounds() {
        let opts = AdvisorOptions::default().with_pool_bounds(8, 4);
        assert!(matches!(
            opts.validate(),
            Err(AdvisorError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_zero_pool() {
        let opts = AdvisorOptions::default().with_pool_bounds(0, 0);
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let opts = AdvisorOptions::default().with_explain_timeout_ms(0);
        assert!(opts.validate().is_err());
    }
}

mod db_config_tests {
    use super::*;

    #[test]
    fn test_connection_string() {
        let cfg = DbConfig::new("db.internal", 5433, "app", "advisor", "s3cret");
        assert_eq!(
            cfg.connection_string(),
            "host=db.internal port=5433 dbname=app user=advisor password=s3cret"
        );
    }
}
