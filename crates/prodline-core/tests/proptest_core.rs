//! Property-based tests for the production line.
//!
//! Uses proptest to generate attribute values, weights, seeds and control
//! sequences, then verify structural invariants hold.

use prodline_core::coordinator::Coordinator;
use prodline_core::id::StageId;
use prodline_core::test_utils::*;
use prodline_core::token::{Dimensions, Token, TokenKind, compose_shape};
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

fn arb_basic_kind() -> impl Strategy<Value = TokenKind> {
    prop_oneof![
        Just(TokenKind::Base),
        Just(TokenKind::Body),
        Just(TokenKind::Detail),
    ]
}

fn arb_dims() -> impl Strategy<Value = Dimensions> {
    (1u32..50, 1u32..50, 1u32..50)
        .prop_map(|(w, h, d)| Dimensions::from_f64(w as f64 / 4.0, h as f64 / 4.0, d as f64 / 4.0).unwrap())
}

/// Control operations applied between steps.
#[derive(Debug, Clone)]
enum ControlOp {
    Step(u64),
    Pause(bool),
    Toggle(usize),
    Inject(usize),
}

const STAGES: [&str; 8] = [
    "base_a", "base_b", "belt_a", "belt_b", "press", "gate", "good", "scrap",
];

fn arb_control_sequence(max_ops: usize) -> impl Strategy<Value = Vec<ControlOp>> {
    proptest::collection::vec(
        prop_oneof![
            4 => (1u64..10).prop_map(ControlOp::Step),
            1 => any::<bool>().prop_map(ControlOp::Pause),
            1 => (0..STAGES.len()).prop_map(ControlOp::Toggle),
            1 => (0..STAGES.len()).prop_map(ControlOp::Inject),
        ],
        1..max_ops,
    )
}

fn apply(line: &mut Coordinator, op: &ControlOp) {
    match op {
        ControlOp::Step(n) => {
            line.advance(*n);
        }
        ControlOp::Pause(p) => line.set_paused(*p),
        ControlOp::Toggle(i) => {
            let name = STAGES[*i];
            let enabled = line.stage(name).map(|s| s.enabled).unwrap_or(true);
            let result = if enabled {
                line.disable_stage(name)
            } else {
                line.enable_stage(name)
            };
            assert!(result.is_ok());
        }
        ControlOp::Inject(i) => {
            // Refusals by disabled stages are expected.
            let _ = line.inject(STAGES[*i], TokenKind::Base);
        }
    }
}

/// Every token held by a stage is live, and nothing else is.
fn assert_index_matches_stages(line: &Coordinator) {
    let mut held: Vec<String> = STAGES
        .iter()
        .flat_map(|name| line.held_tokens(name))
        .map(|t| t.id().to_string())
        .collect();
    held.sort();
    let live: Vec<String> = line
        .live_token_ids()
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(held, live);
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #[test]
    fn composition_is_order_insensitive_in_kind(a in arb_basic_kind(), b in arb_basic_kind()) {
        let (ab, _) = compose_shape(a, Dimensions::unit(), b, Dimensions::unit());
        let (ba, _) = compose_shape(b, Dimensions::unit(), a, Dimensions::unit());
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn side_by_side_dimensions(da in arb_dims(), db in arb_dims()) {
        let (kind, dims) = compose_shape(TokenKind::Base, da, TokenKind::Base, db);
        prop_assert_eq!(kind, TokenKind::Composite2);
        prop_assert_eq!(dims.width, da.width + db.width);
        prop_assert_eq!(dims.height, da.height.max(db.height));
        prop_assert_eq!(dims.depth, da.depth.max(db.depth));
    }

    #[test]
    fn composing_is_deterministic(a in 0i32..100, b in 0i32..100) {
        let first = Token::compose(base_token("AAAAAA", a), base_token("BBBBBB", b), 3, StageId::default());
        let second = Token::compose(base_token("AAAAAA", a), base_token("BBBBBB", b), 3, StageId::default());
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.quality_values(), Some((a, b)));
    }

    #[test]
    fn retire_is_idempotent(retires in 1usize..5) {
        let mut line = build("retire", vec![
            provider("src", TokenKind::Base, 1000).to(["bin"]),
            storer("bin"),
        ]);
        let token = base_token("QQQQQQ", 1);
        prop_assert!(line.register_token(&token));
        prop_assert!(line.retire_token(token.id()));
        for _ in 0..retires {
            prop_assert!(!line.retire_token(token.id()));
        }
        prop_assert!(!line.live_token_ids().contains(token.id()));
    }

    #[test]
    fn splitter_never_loses_tokens(w0 in 0u32..10, w1 in 1u32..10, steps in 10u64..200) {
        let mut line = build("split", vec![
            provider("src", TokenKind::Base, 1).to(["split"]),
            splitter("split", &[w0 as f64, w1 as f64]).to(["left", "right"]),
            storer("left"),
            storer("right"),
        ]);
        line.advance(steps);
        let stored = line.held_tokens("left").len() + line.held_tokens("right").len();
        let queued = line.held_tokens("split").len();
        prop_assert_eq!((stored + queued) as u64, steps);
        if w0 == 0 {
            prop_assert!(line.held_tokens("left").is_empty());
        }
    }

    #[test]
    fn live_index_tracks_held_tokens(ops in arb_control_sequence(20)) {
        let mut line = Coordinator::build(&assembly_line()).unwrap();
        for op in &ops {
            apply(&mut line, op);
            assert_index_matches_stages(&line);
        }
    }

    #[test]
    fn control_sequences_are_deterministic(seed in any::<u64>(), ops in arb_control_sequence(15)) {
        let mut a = Coordinator::build(&assembly_line().with_seed(seed)).unwrap();
        let mut b = Coordinator::build(&assembly_line().with_seed(seed)).unwrap();
        for op in &ops {
            apply(&mut a, op);
            apply(&mut b, op);
        }
        prop_assert_eq!(a.state_hash(), b.state_hash());
        prop_assert_eq!(a.live_token_ids(), b.live_token_ids());
    }
}
