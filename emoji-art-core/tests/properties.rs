//! Property tests for the model codec and store naming.

use std::collections::HashSet;
use std::sync::Arc;

use emoji_art_core::{BackgroundRef, DocumentStore, EmojiArtModel, MemoryStorage, StoreConfig};
use proptest::prelude::*;

fn arb_model() -> impl Strategy<Value = EmojiArtModel> {
    let placement = ("[😀🐶🍎🌈]{1,2}", -500i32..500, -500i32..500, 1u32..200);
    (
        proptest::option::of("https://example\\.com/[a-z]{1,8}\\.png"),
        proptest::collection::vec(placement, 0..12),
    )
        .prop_map(|(background, placements)| {
            let mut model = EmojiArtModel::new();
            model.set_background_reference(background.map(BackgroundRef::new));
            for (text, x, y, size) in placements {
                model.add_emoji(text, x, y, size);
            }
            model
        })
}

#[derive(Debug, Clone)]
enum NameOp {
    Create,
    Rename(usize, String),
    Remove(usize),
}

fn arb_name_op() -> impl Strategy<Value = NameOp> {
    prop_oneof![
        3 => Just(NameOp::Create),
        2 => (any::<usize>(), prop_oneof![
            Just("Untitled".to_string()),
            Just("Untitled 2".to_string()),
            "[A-C]{1,2}",
        ])
            .prop_map(|(i, name)| NameOp::Rename(i, name)),
        1 => any::<usize>().prop_map(NameOp::Remove),
    ]
}

proptest! {
    #[test]
    fn prop_model_roundtrips(model in arb_model()) {
        let bytes = model.serialize().expect("serialize");
        let decoded = EmojiArtModel::deserialize(&bytes).expect("deserialize");
        prop_assert_eq!(decoded, model);
    }

    #[test]
    fn prop_names_stay_unique(ops in proptest::collection::vec(arb_name_op(), 1..40)) {
        let mut store = DocumentStore::new(StoreConfig::default(), Arc::new(MemoryStorage::new()));
        for op in ops {
            let ids: Vec<_> = store.list().into_iter().map(|(id, _)| id).collect();
            match op {
                NameOp::Create => {
                    store.create_document();
                }
                NameOp::Rename(i, name) if !ids.is_empty() => {
                    store.rename(ids[i % ids.len()], name);
                }
                NameOp::Remove(i) if !ids.is_empty() => {
                    store.remove_document(ids[i % ids.len()]).expect("remove");
                }
                _ => {}
            }

            let names: Vec<String> = store.list().into_iter().map(|(_, name)| name).collect();
            let unique: HashSet<&String> = names.iter().collect();
            prop_assert_eq!(unique.len(), names.len());
        }
    }
}
