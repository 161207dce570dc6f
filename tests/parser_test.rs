use wtemplate::{
    error::{Error, Position},
    parser::{extract_nodes, replace_nodes, NodeHandler},
};

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl NodeHandler for Recorder {
    fn text(&mut self, text: &str) -> wtemplate::Result<()> {
        self.events.push(format!("text:{text}"));
        Ok(())
    }

    fn node(&mut self, node: &str, inner: bool) -> wtemplate::Result<String> {
        self.events.push(format!("node:{node}:{inner}"));
        Ok(if inner { "X".to_string() } else { String::new() })
    }
}

fn record(source: &str) -> Vec<String> {
    let mut recorder = Recorder::default();
    extract_nodes(source, &mut recorder).unwrap();
    recorder.events
}

#[test]
fn test_text_and_nodes_in_order() {
    assert_eq!(
        record("Hello {$name}!"),
        vec!["text:Hello ", "node:$name:false", "text:!"]
    );
}

#[test]
fn test_inner_nodes_are_resolved_first() {
    assert_eq!(
        record("{if {$a} == {$b}}"),
        vec!["node:$a:true", "node:$b:true", "node:if X == X:false"]
    );
}

#[test]
fn test_escaped_braces_are_literal() {
    assert_eq!(record(r"\{$x\}"), vec!["text:{$x}"]);
    assert_eq!(record(r"a\\b"), vec![r"text:a\b"]);
}

#[test]
fn test_braces_not_opening_a_node() {
    assert_eq!(record("{ a } {\"k\": 1}"), vec!["text:{ a } {\"k\": 1}"]);
}

#[test]
fn test_comments_are_dropped() {
    assert_eq!(record("a{% note {$x} %}b"), vec!["text:ab"]);
    let err = replace_nodes("a{% never closed", |_, _| Ok(String::new())).unwrap_err();
    assert!(matches!(err, Error::SyntaxError { .. }));
}

#[test]
fn test_line_break_inside_node() {
    let err = replace_nodes("{if $a\n}", |_, _| Ok(String::new())).unwrap_err();
    match err {
        Error::SyntaxError { message, position } => {
            assert!(message.contains("illegal line break"));
            assert_eq!(position, Some(Position { line: 1, column: 1 }));
        }
        other => panic!("Expected SyntaxError, got {other:?}"),
    }
}

#[test]
fn test_unterminated_node() {
    let err = replace_nodes("text {$a", |_, _| Ok(String::new())).unwrap_err();
    assert!(err.to_string().contains("unterminated node"));
}

#[test]
fn test_replace_nodes() {
    let output = replace_nodes("{$a} and {$b}", |node, _| Ok(node.to_uppercase())).unwrap();
    assert_eq!(output, "$A and $B");
}
