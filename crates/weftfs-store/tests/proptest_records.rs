//! Property tests: registry records survive a JSON encode/decode round
//! trip (modulo `meta`, which only reads populate).

use proptest::prelude::*;
use std::collections::HashMap;

use weftfs_store::{DatasetClone, DatasetId, Origin, RegistryDataset};

fn id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9-]{1,24}"
}

fn metadata_strategy() -> impl Strategy<Value = HashMap<String, String>> {
    proptest::collection::hash_map("[a-z]{1,8}", "[a-zA-Z0-9 ]{0,16}", 0..4)
}

proptest! {
    #[test]
    fn test_dataset_json_round_trip(
        id in id_strategy(),
        owner in id_strategy(),
        name in id_strategy(),
        collaborators in proptest::collection::vec(id_strategy(), 0..3),
        metadata in metadata_strategy(),
    ) {
        let original = RegistryDataset {
            id: DatasetId::new(id),
            owner_id: owner,
            name,
            collaborator_ids: collaborators,
            metadata,
            ..Default::default()
        };

        let bytes = serde_json::to_vec(&original).unwrap();
        let decoded: RegistryDataset = serde_json::from_slice(&bytes).unwrap();

        prop_assert_eq!(decoded.id, original.id);
        prop_assert_eq!(decoded.owner_id, original.owner_id);
        prop_assert_eq!(decoded.name, original.name);
        prop_assert_eq!(decoded.collaborator_ids, original.collaborator_ids);
        prop_assert_eq!(decoded.metadata, original.metadata);
    }

    #[test]
    fn test_clone_json_round_trip(
        child in id_strategy(),
        parent in id_strategy(),
        snapshot in id_strategy(),
        branch in id_strategy(),
    ) {
        let original = DatasetClone {
            filesystem_id: DatasetId::new(child),
            origin: Origin {
                filesystem_id: DatasetId::new(parent),
                snapshot_id: snapshot,
            },
            name: branch,
            ..Default::default()
        };

        let bytes = serde_json::to_vec(&original).unwrap();
        let decoded: DatasetClone = serde_json::from_slice(&bytes).unwrap();

        prop_assert_eq!(decoded.filesystem_id, original.filesystem_id);
        prop_assert_eq!(decoded.origin, original.origin);
        prop_assert_eq!(decoded.name, original.name);
    }
}
