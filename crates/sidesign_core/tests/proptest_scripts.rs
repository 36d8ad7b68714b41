//! Property-based tests for script building and classification.

use proptest::prelude::*;

use sidesign_core::script::{
    multisig, pay_to_pubkey_hash, pay_to_script_hash, with_replay_suffix, Destination,
    Instruction, Script, ScriptBuilder,
};
use sidesign_core::sighash::SigHashMode;

fn arb_pubkey() -> impl Strategy<Value = Vec<u8>> {
    (prop::bool::ANY, any::<[u8; 32]>()).prop_map(|(odd, body)| {
        let mut pk = vec![if odd { 0x03 } else { 0x02 }];
        pk.extend(body);
        pk
    })
}

proptest! {
    /// Built pushes decode back to the same items.
    #[test]
    fn builder_pushes_round_trip(
        items in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..128), 0..8),
    ) {
        let mut builder = ScriptBuilder::new();
        for item in &items {
            builder = builder.push_slice(item);
        }
        let script = builder.into_script();
        prop_assert!(script.is_push_only());

        let decoded: Vec<Vec<u8>> = script
            .instructions()
            .map(|ins| match ins.unwrap() {
                Instruction::Push(data) => data.to_vec(),
                Instruction::Op(op) => vec![op - 0x50],
            })
            .collect();
        prop_assert_eq!(decoded, items);
    }

    /// Classification is stable under the replay-protection suffix.
    #[test]
    fn replay_suffix_does_not_change_destination(
        hash in any::<[u8; 20]>(),
        block_hash in any::<[u8; 32]>(),
        height in 1u32..2_000_000,
    ) {
        let plain = pay_to_pubkey_hash(&hash);
        let suffixed = with_replay_suffix(&plain, &block_hash, height);
        prop_assert_eq!(plain.destination(), suffixed.destination());
        prop_assert!(suffixed.has_replay_suffix());
        prop_assert!(!plain.has_replay_suffix());
    }

    /// Script-hash classification never sees through to the inner pattern.
    #[test]
    fn script_hash_classifies_by_template(hash in any::<[u8; 20]>()) {
        let script = pay_to_script_hash(&hash);
        prop_assert_eq!(script.destination(), Destination::ScriptHash(hash));
    }

    /// Any well-formed m-of-n over valid keys classifies back to itself.
    #[test]
    fn multisig_classification_round_trips(
        pubkeys in prop::collection::vec(arb_pubkey(), 1..6),
        required_seed in 1usize..6,
    ) {
        let required = required_seed.min(pubkeys.len());
        let script = multisig(required, &pubkeys);
        prop_assert_eq!(
            script.destination(),
            Destination::Multisig { required, pubkeys }
        );
    }

    /// Instruction iteration never panics on arbitrary bytes.
    #[test]
    fn instruction_iteration_is_total(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let script = Script::from_bytes(bytes);
        let _ = script.parse();
        let _ = script.destination();
        let _ = script.is_push_only();
    }

    /// Every defined sighash byte survives the byte round-trip.
    #[test]
    fn sighash_byte_round_trips(b in any::<u8>()) {
        if let Some(mode) = SigHashMode::from_byte(b) {
            prop_assert_eq!(mode.to_byte(), b);
        }
    }
}
