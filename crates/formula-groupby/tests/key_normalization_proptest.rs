use encoding_rs::{UTF_16LE, WINDOWS_1252};
use formula_groupby::{
    BinaryStorage, GroupKey, Normalizer, RowMeta, StoredValue, Value, ValueMeta, ValueType,
};
use proptest::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const CASES: u32 = 256;

fn hash_of(key: &GroupKey) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

fn plain_meta() -> RowMeta {
    RowMeta::new(vec![
        ValueMeta::new("name", ValueType::String),
        ValueMeta::new("qty", ValueType::Integer),
        ValueMeta::new("price", ValueType::Number),
    ])
}

fn binary_meta(name_storage: BinaryStorage) -> RowMeta {
    RowMeta::new(vec![
        ValueMeta::new("name", ValueType::String).with_binary_storage(name_storage),
        ValueMeta::new("qty", ValueType::Integer).with_binary_storage(BinaryStorage::default()),
        ValueMeta::new("price", ValueType::Number).with_binary_storage(BinaryStorage::default()),
    ])
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: CASES,
        max_shrink_iters: 0,
        .. ProptestConfig::default()
    })]

    #[test]
    fn encodings_of_one_value_share_a_key(
        name in "[a-zA-Z0-9 äöüéÅ]{1,12}",
        qty in any::<i32>(),
        price in -1.0e6f64..1.0e6,
    ) {
        let normalizer = Normalizer::default();
        let columns = [0, 1, 2];

        let plain = GroupKey::build(
            &[
                StoredValue::from(Value::from(name.as_str())),
                Value::Integer(i64::from(qty)).into(),
                Value::Number(price).into(),
            ],
            &columns,
            &plain_meta(),
            &normalizer,
        )
        .unwrap();

        let (latin1, _, unmappable) = WINDOWS_1252.encode(&name);
        prop_assume!(!unmappable);
        let utf16: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();

        for (storage, bytes) in [
            (BinaryStorage::default(), name.as_bytes().to_vec()),
            (BinaryStorage::new(WINDOWS_1252), latin1.into_owned()),
            (BinaryStorage::new(UTF_16LE), utf16),
        ] {
            let encoded = GroupKey::build(
                &[
                    StoredValue::binary(bytes),
                    StoredValue::binary(qty.to_string()),
                    StoredValue::binary(format!("{price:?}")),
                ],
                &columns,
                &binary_meta(storage),
                &normalizer,
            )
            .unwrap();
            prop_assert_eq!(&encoded, &plain);
            prop_assert_eq!(hash_of(&encoded), hash_of(&plain));
        }
    }
}
