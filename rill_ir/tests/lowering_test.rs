//! Integration tests for AST → IR lowering

use pretty_assertions::assert_eq;
use rill_analysis::{analyze, SymbolTable};
use rill_common::Generators;
use rill_ir::{lower, Cond, FuncFrag, Instr, Operand, GLOBALS_FRAGMENT_LABEL};
use rill_parser::parse_source;

fn lower_program(body: &str) -> (Vec<FuncFrag>, SymbolTable) {
    let source = format!("package main;\nimport \"fmt\";\n{}", body);
    let program = parse_source(&source).expect("test program should parse");
    let mut gens = Generators::new();
    let analysis = analyze(&program, &mut gens);
    assert!(
        !analysis.diagnostics.has_errors(),
        "unexpected semantic errors: {:?}",
        analysis.diagnostics.messages
    );
    let frags = lower(&program, &analysis.table, &mut gens).expect("lowering should succeed");
    (frags, analysis.table)
}

fn function_body<'a>(frags: &'a [FuncFrag], label: &str) -> &'a [Instr] {
    &frags.iter().find(|f| f.label == label).expect("fragment exists").body
}

#[test]
fn the_first_fragment_declares_the_globals() {
    let (frags, _) = lower_program("var g, h int;\nfunc main() { }");
    assert_eq!(frags[0].label, GLOBALS_FRAGMENT_LABEL);
    assert_eq!(
        frags[0].body,
        vec![
            Instr::GlobalDecl { name: "g".to_string() },
            Instr::GlobalDecl { name: "h".to_string() },
        ]
    );
    assert_eq!(frags[1].label, "main");
}

#[test]
fn literal_arithmetic_folds_the_right_side_into_immediates() {
    let (frags, _) = lower_program("func main() { var a int; a = 3 + 4 + 5; }");
    let body = function_body(&frags, "main");
    assert!(matches!(body[0], Instr::Mov { src: Operand::Imm(3), cond: Cond::Al, .. }));
    assert!(matches!(body[1], Instr::Add { rhs: Operand::Imm(4), .. }));
    assert!(matches!(body[2], Instr::Add { rhs: Operand::Imm(5), .. }));
    // final move into the variable's register
    assert!(matches!(body[3], Instr::Mov { src: Operand::Reg(_), cond: Cond::Al, .. }));
}

#[test]
fn comparison_lowers_to_mov_cmp_conditional_mov() {
    let (frags, _) = lower_program("func main() { var b bool; b = 1 < 2; }");
    let body = function_body(&frags, "main");
    let position = body
        .iter()
        .position(|instr| matches!(instr, Instr::Cmp { .. }))
        .expect("comparison emits a cmp");
    assert!(matches!(
        body[position - 1],
        Instr::Mov { src: Operand::Imm(0), cond: Cond::Al, .. }
    ));
    assert!(matches!(
        body[position + 1],
        Instr::Mov { src: Operand::Imm(1), cond: Cond::Lt, .. }
    ));
}

#[test]
fn logical_operators_evaluate_both_sides() {
    let (frags, _) = lower_program("func main() { var b bool; b = true && false; }");
    let body = function_body(&frags, "main");
    // Two materialized literals, then the AND; no branching.
    assert!(body.iter().any(|i| matches!(i, Instr::And { rhs: Operand::Reg(_), .. })));
    assert!(!body.iter().any(|i| matches!(i, Instr::Branch { .. })));
}

#[test]
fn global_reads_and_writes_go_through_the_name() {
    let (frags, _) = lower_program("var g int;\nfunc main() { var a int; g = 1; a = g; }");
    let body = function_body(&frags, "main");
    assert!(body
        .iter()
        .any(|i| matches!(i, Instr::StoreGlobal { name, .. } if name == "g")));
    assert!(body
        .iter()
        .any(|i| matches!(i, Instr::LoadGlobal { name, .. } if name == "g")));
}

#[test]
fn locals_shadow_globals() {
    let (frags, _) = lower_program("var g int;\nfunc main() { var g int; g = 1; }");
    let body = function_body(&frags, "main");
    assert!(!body.iter().any(|i| matches!(i, Instr::StoreGlobal { .. })));
    assert!(body.iter().any(|i| matches!(i, Instr::Mov { .. })));
}

#[test]
fn field_access_uses_declaration_ordinals() {
    let (frags, _) = lower_program(
        "type Pair struct { x int; y int; };\n\
         func main() { var p *Pair; var a int; p = new(Pair); p.y = 3; a = p.x; }",
    );
    let body = function_body(&frags, "main");
    assert!(body.iter().any(|i| matches!(
        i,
        Instr::NewRecord { type_name, fields: 2, .. } if type_name == "Pair"
    )));
    assert!(body.iter().any(|i| matches!(
        i,
        Instr::StoreField { field, index: 1, .. } if field == "y"
    )));
    assert!(body.iter().any(|i| matches!(
        i,
        Instr::LoadField { field, index: 0, .. } if field == "x"
    )));
}

#[test]
fn delete_lowers_to_a_free() {
    let (frags, _) = lower_program(
        "type Pair struct { x int; };\nfunc main() { var p *Pair; p = new(Pair); delete(p); }",
    );
    let body = function_body(&frags, "main");
    assert!(body.iter().any(|i| matches!(i, Instr::Delete { .. })));
}

#[test]
fn calls_push_the_callees_evaluated_argument_registers() {
    let (frags, _) = lower_program(
        "func add(a int, b int) int { return a + b; }\n\
         func main() { var r int; r = add(20, 22); }",
    );
    let body = function_body(&frags, "main");

    let push_args = body
        .iter()
        .find_map(|i| match i {
            Instr::Push { args, callee } if callee == "add" => Some(args.clone()),
            _ => None,
        })
        .expect("call emits a push");
    assert_eq!(push_args.len(), 2);

    // The pushed registers are the two literal materializations right before
    // the push, not the callee's parameter registers.
    let materialized: Vec<_> = body
        .iter()
        .filter_map(|i| match i {
            Instr::Mov { dest, src: Operand::Imm(v), .. } if *v == 20 || *v == 22 => Some(*dest),
            _ => None,
        })
        .collect();
    assert_eq!(push_args, materialized);

    // push, bl, result capture, pop — in that order
    let sequence: Vec<&str> = body
        .iter()
        .filter_map(|i| match i {
            Instr::Push { .. } => Some("push"),
            Instr::Call { .. } => Some("bl"),
            Instr::Mov { from_call: true, .. } => Some("ret-capture"),
            Instr::Pop { .. } => Some("pop"),
            _ => None,
        })
        .collect();
    assert_eq!(sequence, vec!["push", "bl", "ret-capture", "pop"]);
}

#[test]
fn conditional_emits_forward_branches_only() {
    let (frags, _) = lower_program(
        "func main() { var a int; a = 7; if (a > 3) { a = 1; } else { a = 0; } }",
    );
    let labels: Vec<&str> = frags.iter().map(|f| f.label.as_str()).collect();
    // entry, else-block, done-block
    assert_eq!(labels.len(), 4);
    assert!(labels[2].starts_with("else_L"));
    assert!(labels[3].starts_with("done_L"));

    // every branch in the entry fragment points at a later fragment
    for instr in function_body(&frags, "main") {
        if let Instr::Branch { label, .. } = instr {
            let target = frags.iter().position(|f| &f.label == label).expect("target exists");
            assert!(target > 1, "forward branch expected, got target {}", target);
        }
    }
}

#[test]
fn conditional_without_else_branches_to_done() {
    let (frags, _) = lower_program("func main() { var a int; if (a < 1) { a = 1; } }");
    let body = function_body(&frags, "main");
    let eq_branch = body
        .iter()
        .find_map(|i| match i {
            Instr::Branch { cond: Cond::Eq, label } => Some(label.clone()),
            _ => None,
        })
        .expect("condition branch exists");
    assert!(eq_branch.starts_with("done_L"));
    assert!(!frags.iter().any(|f| f.label.starts_with("else_L")));
}

#[test]
fn loop_places_the_condition_after_the_body_with_a_back_edge() {
    let (frags, _) = lower_program(
        "func main() { var i int; i = 0; for (i < 3) { i = i + 1; } }",
    );
    let labels: Vec<&str> = frags.iter().map(|f| f.label.as_str()).collect();
    assert!(labels[2].starts_with("body_L"));
    assert!(labels[3].starts_with("cond_L"));

    // entry jumps forward to the condition
    let entry = function_body(&frags, "main");
    assert!(matches!(
        entry.last(),
        Some(Instr::Branch { cond: Cond::Al, label }) if label.starts_with("cond_L")
    ));

    // condition fragment compares against 1 and branches back into the body
    let cond_frag = &frags[3];
    assert!(cond_frag
        .body
        .iter()
        .any(|i| matches!(i, Instr::Cmp { rhs: Operand::Imm(1), .. })));
    assert!(matches!(
        cond_frag.body.last(),
        Some(Instr::Branch { cond: Cond::Eq, label }) if label.starts_with("body_L")
    ));
}

#[test]
fn scan_of_a_global_stores_back_scan_of_a_local_reads_in_place() {
    let (frags, _) = lower_program("var g int;\nfunc main() { var l int; fmt.Scan(&g); fmt.Scan(&l); }");
    let body = function_body(&frags, "main");
    assert!(matches!(body[0], Instr::Read { .. }));
    assert!(matches!(&body[1], Instr::StoreGlobal { name, .. } if name == "g"));
    assert!(matches!(body[2], Instr::Read { .. }));
    assert_eq!(body.len(), 3);
}

#[test]
fn print_of_a_global_loads_it_first() {
    let (frags, _) = lower_program("var g int;\nfunc main() { fmt.Println(g); }");
    let body = function_body(&frags, "main");
    assert!(matches!(&body[0], Instr::LoadGlobal { name, .. } if name == "g"));
    assert!(matches!(body[1], Instr::Println { .. }));
}

#[test]
fn return_lowers_onto_the_current_fragment() {
    let (frags, _) = lower_program(
        "func pick(a int) int { if (a > 0) { return a; } return 0; }\nfunc main() { }",
    );
    // the then-block return sits in the entry fragment, the final return in
    // the done fragment
    let entry = function_body(&frags, "pick");
    assert!(entry.iter().any(|i| matches!(i, Instr::Ret { src: Some(_) })));
    let done = frags.iter().find(|f| f.label.starts_with("done_L")).unwrap();
    assert!(done.body.iter().any(|i| matches!(i, Instr::Ret { src: Some(_) })));
}

#[test]
fn fresh_targets_are_never_reused() {
    let (frags, _) = lower_program(
        "type Pair struct { x int; y int; };\n\
         var g int;\n\
         func add(a int, b int) int { return a + b; }\n\
         func main() {\n\
             var p *Pair; var r int;\n\
             p = new(Pair); p.x = 2; p.y = g + 3;\n\
             r = add(p.x, p.y) * 2;\n\
             fmt.Println(r);\n\
         }",
    );
    // Every instruction kind that always allocates a fresh destination must
    // target each register at most once across the whole program.
    let mut seen = std::collections::HashSet::new();
    for frag in &frags {
        for instr in &frag.body {
            let fresh_dest = match instr {
                Instr::Add { dest, .. }
                | Instr::Sub { dest, .. }
                | Instr::Mul { dest, .. }
                | Instr::Div { dest, .. }
                | Instr::And { dest, .. }
                | Instr::Or { dest, .. }
                | Instr::Not { dest, .. }
                | Instr::LoadGlobal { dest, .. }
                | Instr::LoadField { dest, .. }
                | Instr::NewRecord { dest, .. } => Some(*dest),
                _ => None,
            };
            if let Some(dest) = fresh_dest {
                assert!(seen.insert(dest), "register r{} targeted twice", dest);
            }
        }
    }
}

#[test]
fn unary_minus_subtracts_from_zero() {
    let (frags, _) = lower_program("func main() { var a int; a = -a; }");
    let body = function_body(&frags, "main");
    assert!(matches!(body[0], Instr::Mov { src: Operand::Imm(0), .. }));
    assert!(matches!(body[1], Instr::Sub { rhs: Operand::Reg(_), .. }));
}

#[test]
fn not_lowers_to_a_not_instruction() {
    let (frags, _) = lower_program("func main() { var b bool; b = !b; }");
    let body = function_body(&frags, "main");
    assert!(matches!(body[0], Instr::Not { operand: Operand::Reg(_), .. }));
}
