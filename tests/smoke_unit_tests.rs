//! Smoke screen tests across the public API
//!
//! Happy-path checks of the building blocks in isolation from the workflow
//! scenarios.

use stock_workflow::{
    EngineConfig, InMemoryDirectory, PrincipalId, Role, RoleDirectory, Stage, TransactionId,
    TransactionType, WorkflowRegistry, utils::new_uuid_to_bech32,
};

mod utils_tests {
    use super::*;

    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("txn").unwrap();
        assert!(encoded.starts_with("txn1"));
        assert!(encoded.len() > 10);
    }

    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = TransactionId::generate().unwrap();
        let b = TransactionId::generate().unwrap();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("txn1"));
    }
}

mod registry_tests {
    use super::*;

    #[test]
    fn every_type_starts_in_draft_and_ends_completed() {
        let registry = WorkflowRegistry::default();
        for kind in [
            TransactionType::Receipt,
            TransactionType::Issuance,
            TransactionType::Transfer,
            TransactionType::Swap,
        ] {
            let stages = registry.stages_for(kind).unwrap();
            assert_eq!(stages.first(), Some(&Stage::Draft));
            assert_eq!(stages.last(), Some(&Stage::Completed));
        }
    }

    #[test]
    fn swap_completion_is_shared() {
        let registry = WorkflowRegistry::standard();
        for role in [Role::Supervisor, Role::Admin] {
            let permissions = registry
                .permissions_for(TransactionType::Swap, role)
                .unwrap();
            assert!(permissions.can_approve_into.contains(&Stage::Completed));
        }
    }

    #[test]
    fn numbers_use_type_prefixes() {
        assert_eq!(TransactionType::Receipt.transaction_number(1), "RCV-000001");
        assert_eq!(TransactionType::Swap.transaction_number(42), "SWP-000042");
    }
}

mod directory_tests {
    use super::*;

    #[test]
    fn resolves_registered_principals() {
        let directory = InMemoryDirectory::new();
        directory.add_principal("sue", Role::Supervisor);

        let actor = directory.resolve(&PrincipalId::from("sue")).unwrap();
        assert_eq!(actor.role, Role::Supervisor);
        assert!(directory.resolve(&PrincipalId::from("nobody")).is_err());
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config =
            EngineConfig::load_from(Some(std::path::Path::new("/nonexistent/engine.toml"))).unwrap();
        assert_eq!(config.log_level, "info");
        assert!(config.flush_on_commit);
    }
}
