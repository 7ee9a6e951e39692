//! Property tests for loop-nesting analysis and snapshot sizing.

mod common;

use common::interpreter;
use proptest::prelude::*;
use rewind_compiler::bytecode::{decode, CodeObject};
use rewind_compiler::FunctionBuilder;
use rewind_vm::continuation::loop_nesting_level;
use rewind_vm::Value;

#[derive(Debug, Clone, Copy)]
enum LoopKind {
    For,
    While,
}

#[derive(Debug, Clone)]
struct Layer {
    kind: LoopKind,
    /// Closed for-loops emitted before the nested body.
    before: u8,
    /// Closed for-loops emitted after the nested body.
    after: u8,
}

fn layer() -> impl Strategy<Value = Layer> {
    (prop_oneof![Just(LoopKind::For), Just(LoopKind::While)], 0..3u8, 0..3u8)
        .prop_map(|(kind, before, after)| Layer { kind, before, after })
}

/// `for _ in range(1): pass`
fn closed_loop(builder: &mut FunctionBuilder) {
    let head = builder.create_label();
    let exit = builder.create_label();
    builder.emit_load_global("range");
    builder.emit_load_int(1);
    builder.emit_call_function(1);
    builder.emit_get_iter();
    builder.bind_label(head);
    builder.emit_for_iter(exit);
    builder.emit_pop_top();
    builder.emit_jump_absolute(head);
    builder.bind_label(exit);
}

/// Emit `layers` around a `probe()` call, returning the call's offset.
fn emit_layers(builder: &mut FunctionBuilder, layers: &[Layer], depth: usize) -> u32 {
    let Some(layer) = layers.first() else {
        builder.emit_load_global("probe");
        let site = builder.emit_call_function(0);
        builder.emit_pop_top();
        return site;
    };

    let head = builder.create_label();
    let exit = builder.create_label();
    match layer.kind {
        LoopKind::For => {
            builder.emit_load_global("range");
            builder.emit_load_int(1);
            builder.emit_call_function(1);
            builder.emit_get_iter();
            builder.bind_label(head);
            builder.emit_for_iter(exit);
            builder.emit_pop_top();
        }
        LoopKind::While => {
            // flag = True; while flag: flag = False; ...
            let flag = builder.define_local(format!("flag{}", depth));
            builder.emit_load_bool(true);
            builder.emit_store_fast(flag);
            builder.bind_label(head);
            builder.emit_load_fast(flag);
            builder.emit_pop_jump_if_false(exit);
            builder.emit_load_bool(false);
            builder.emit_store_fast(flag);
        }
    }

    for _ in 0..layer.before {
        closed_loop(builder);
    }
    let site = emit_layers(builder, &layers[1..], depth + 1);
    for _ in 0..layer.after {
        closed_loop(builder);
    }

    builder.emit_jump_absolute(head);
    builder.bind_label(exit);
    site
}

fn build(layers: &[Layer]) -> (CodeObject, u32) {
    let mut builder = FunctionBuilder::new("nested");
    let site = emit_layers(&mut builder, layers, 0);
    builder.emit_return_none();
    (builder.finish().unwrap(), site)
}

fn for_loops(layers: &[Layer]) -> usize {
    layers
        .iter()
        .filter(|layer| matches!(layer.kind, LoopKind::For))
        .count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_nesting_level_counts_enclosing_for_loops(
        layers in prop::collection::vec(layer(), 0..6)
    ) {
        let (code, site) = build(&layers);
        let instructions = decode(&code.bytecode).unwrap();
        prop_assert_eq!(
            loop_nesting_level(&instructions, site, site),
            for_loops(&layers)
        );
    }

    #[test]
    fn prop_snapshot_matches_live_stack(
        layers in prop::collection::vec(layer(), 0..5)
    ) {
        let (code, _) = build(&layers);
        let nlocals = code.nlocals();
        let mut interp = interpreter();
        interp.run(code).unwrap();

        // locals + one iterator per for-loop + the callee
        let expected = nlocals + for_loops(&layers) + 1;
        prop_assert_eq!(interp.global("observed_top"), Some(&Value::Int(expected as i64)));
        let Some(Value::Continuation(k)) = interp.global("observed") else {
            panic!("probe did not run");
        };
        prop_assert_eq!(k.innermost().unwrap().operand_stack().len(), expected);
    }
}
