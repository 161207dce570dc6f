use serde_json::json;
use std::path::Path;
use wtemplate::{
    error::{Error, Position},
    expr::Expr,
    instruction::{Bound, Instruction, PathPart},
    variable::{Mode, Segment, VarPath},
    Compiler,
};

fn compile(source: &str) -> wtemplate::Result<Vec<Instruction>> {
    Compiler::new()
        .compile(source, None)
        .map(|template| template.instructions().to_vec())
}

#[test]
fn test_literal_text_is_merged() {
    let instructions = compile(r"a\{b\}c").unwrap();
    assert_eq!(instructions, vec![Instruction::Literal("a{b}c".into())]);
}

#[test]
fn test_variable_node() {
    let instructions = compile("{$user.name|upper}").unwrap();
    match &instructions[..] {
        [Instruction::Emit(var)] => {
            assert_eq!(
                var.path.segments,
                vec![Segment::Key("user".into()), Segment::Key("name".into())]
            );
            assert_eq!(var.filters, vec!["upper".to_string()]);
        }
        other => panic!("Expected a single Emit, got {other:?}"),
    }
}

#[test]
fn test_for_with_key() {
    let instructions = compile("{for $k, $v in $items}{/for}").unwrap();
    match &instructions[0] {
        Instruction::BeginForEach { key, value, depth, .. } => {
            assert_eq!(key, &Some(VarPath::simple("k", Mode::Shared)));
            assert_eq!(value, &VarPath::simple("v", Mode::Shared));
            assert_eq!(*depth, 1);
        }
        other => panic!("Expected BeginForEach, got {other:?}"),
    }
    assert_eq!(instructions[1], Instruction::EndFor);
}

#[test]
fn test_empty_placement() {
    let inline = compile("{for $v in $a}{empty}x{/empty}{/for}").unwrap();
    assert_eq!(inline[1], Instruction::Empty { depth: 1, inline: true });

    let after = compile("{for $v in $a}{/for}{empty}x{/empty}").unwrap();
    assert_eq!(after[2], Instruction::Empty { depth: 1, inline: false });

    let nested = compile("{for $a in $x}{for $b in $a}{/for}{empty}-{/empty}{/for}").unwrap();
    assert_eq!(nested[3], Instruction::Empty { depth: 2, inline: false });

    let separated = compile("{for $a in $x}{for $b in $a}{/for}{$sep}{empty}-{/empty}{/for}").unwrap();
    assert_eq!(separated[4], Instruction::Empty { depth: 2, inline: false });

    let reopened = compile("{for $a in $x}{for $b in $a}{/for}{/for}{for $c in $y}{empty}-{/empty}{/for}").unwrap();
    assert_eq!(reopened[5], Instruction::Empty { depth: 1, inline: true });
}

#[test]
fn test_range_bounds() {
    let instructions = compile("{range $i = 0.2.10}{/range}").unwrap();
    match &instructions[0] {
        Instruction::BeginRange { counter, start, step, end } => {
            assert_eq!(counter, &VarPath::simple("i", Mode::Shared));
            assert_eq!(start, &Bound::Literal(0));
            assert_eq!(step, &Bound::Literal(2));
            assert_eq!(end, &Bound::Literal(10));
        }
        other => panic!("Expected BeginRange, got {other:?}"),
    }

    let instructions = compile("{range $i = -3..{$n}}{/range}").unwrap();
    match &instructions[0] {
        Instruction::BeginRange { start, step, end, .. } => {
            assert_eq!(start, &Bound::Literal(-3));
            assert_eq!(step, &Bound::Literal(1));
            assert!(matches!(end, Bound::Var(_)));
        }
        other => panic!("Expected BeginRange, got {other:?}"),
    }
}

#[test]
fn test_set_and_block() {
    let instructions = compile("{set $a.b = 1 + 2}{block card \"x\" {$y}}").unwrap();
    match &instructions[0] {
        Instruction::Assign { target, value } => {
            assert_eq!(target.segments.len(), 2);
            assert!(matches!(value, Expr::Binary(..)));
        }
        other => panic!("Expected Assign, got {other:?}"),
    }
    match &instructions[1] {
        Instruction::InvokeBlock { name, args } => {
            assert_eq!(name, "card");
            assert_eq!(args.len(), 2);
            assert_eq!(args[0], Expr::Literal(json!("x")));
        }
        other => panic!("Expected InvokeBlock, got {other:?}"),
    }
}

#[test]
fn test_define_block_uses_local_mode() {
    let template = Compiler::new()
        .compile("{define_block card $title}{$title}{/define_block}{$title}", None)
        .unwrap();
    let blocks = template.blocks();
    assert_eq!(blocks["card"].params, vec!["title".to_string()]);

    match (&template.instructions()[1], &template.instructions()[3]) {
        (Instruction::Emit(inside), Instruction::Emit(outside)) => {
            assert_eq!(inside.path.mode, Mode::Local);
            assert_eq!(outside.path.mode, Mode::Shared);
        }
        other => panic!("Expected two Emits, got {other:?}"),
    }
}

#[test]
fn test_include_relative_to_dir() {
    let template = Compiler::new()
        .compile("{include \"../parts/{$name}.html\"}", Some(Path::new("/site/pages")))
        .unwrap();
    assert!(matches!(
        &template.instructions()[0],
        Instruction::Include(parts) if parts[0] == PathPart::Text("/site/parts/".into())
    ));
}

#[test]
fn test_unbalanced_nodes() {
    assert!(matches!(compile("{/if}"), Err(Error::UnbalancedNodeError { .. })));
    assert!(matches!(compile("{if 1}{/for}"), Err(Error::UnbalancedNodeError { .. })));

    let err = compile("{if 1}{for $a in $b}").unwrap_err();
    assert!(matches!(err, Error::UnbalancedNodeError { .. }));
    assert!(err.to_string().contains("if, for"));
}

#[test]
fn test_unknown_node_has_position() {
    let err = compile("line\n  {frobnicate now}").unwrap_err();
    match err {
        Error::UnknownNodeError { node, position } => {
            assert_eq!(node, "frobnicate now");
            assert_eq!(position, Some(Position { line: 2, column: 3 }));
        }
        other => panic!("Expected UnknownNodeError, got {other:?}"),
    }
}

#[test]
fn test_syntax_errors() {
    for source in [
        "{for $v of $items}{/for}",
        "{range $i = 1.0.5}{/range}",
        "{if}{/if}",
        "{else}",
        "{if 1}{else}{elseif 2}{/if}",
        "{set $a == 1}",
        "{set $a|upper = 1}",
        "{define_block a}{define_block b}{/define_block}{/define_block}",
        "{define_block a}{/define_block}{define_block a}{/define_block}",
        "{if {for $a in $b}}{/if}",
    ] {
        assert!(
            matches!(compile(source), Err(Error::SyntaxError { .. })),
            "expected a syntax error for {source}"
        );
    }
}

#[test]
fn test_external_handler() {
    let mut compiler = Compiler::new();
    assert!(compiler.register(
        "lang",
        |args| Ok(vec![Instruction::Literal(format!("[{args}]"))]),
        None
    ));

    let template = compiler.compile("{lang en}", None).unwrap();
    assert_eq!(template.instructions(), &[Instruction::Literal("[en]".into())]);

    // open-only literal handlers can be nested in other nodes
    let template = compiler.compile("{include {lang x}.html}", None).unwrap();
    assert_eq!(
        template.instructions(),
        &[Instruction::Include(vec![PathPart::Text("[x].html".into())])]
    );

    assert!(compiler.unregister("lang"));
    assert!(matches!(
        compiler.compile("{lang en}", None),
        Err(Error::UnknownNodeError { .. })
    ));
}

#[test]
fn test_external_handler_with_close() {
    let mut compiler = Compiler::new();
    compiler.register(
        "box",
        |_| Ok(vec![Instruction::Literal("<div>".into())]),
        Some(std::sync::Arc::new(|| -> wtemplate::Result<Vec<Instruction>> {
            Ok(vec![Instruction::Literal("</div>".into())])
        })),
    );

    let template = compiler.compile("{box}x{/box}", None).unwrap();
    assert_eq!(template.instructions(), &[Instruction::Literal("<div>x</div>".into())]);
    assert!(matches!(
        compiler.compile("{box}x", None),
        Err(Error::UnbalancedNodeError { .. })
    ));
}

#[test]
fn test_compile_is_deterministic() {
    let source = "{if $a}{for $v in $a}{$v}{/for}{else}none{/if}";
    let compiler = Compiler::new();
    assert_eq!(compiler.compile(source, None).unwrap(), compiler.compile(source, None).unwrap());
}
