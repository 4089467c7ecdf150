//! AST → JSON, for tooling that wants the parsed tree without linking the
//! crate.

use crate::processor::ast::Program;

pub fn emit(program: &Program) -> serde_json::Result<String> {
    serde_json::to_string_pretty(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{lexer::tokenize, script_parser::parse};
    use serde_json::{Value, json};

    #[test]
    fn test_tree_shape() {
        let src = r#"{ IMG $i = "a.png"; RESIZE $i 16:9; WEBOPTIMIZE $i LOSSY 40; INT $w = METADATA $i FWIDTH; }"#;
        let program = parse(tokenize(src).unwrap()).unwrap();
        let value: Value = serde_json::from_str(&emit(&program).unwrap()).unwrap();

        let stmts = &value["blocks"][0]["statements"];
        assert_eq!(
            stmts[0],
            json!({ "ImageDeclaration": { "name": "$i", "path": "a.png" } })
        );
        assert_eq!(
            stmts[1],
            json!({ "Resize": { "image": "$i", "spec": { "Aspect": "16:9" } } })
        );
        assert_eq!(
            stmts[2],
            json!({ "WebOptimize": { "image": "$i", "mode": { "Lossy": 40 } } })
        );
        assert_eq!(
            stmts[3]["VariableDeclaration"]["initializer"],
            json!({ "Metadata": { "image": "$i", "kind": "Width" } })
        );
    }
}
