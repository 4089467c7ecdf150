//! Indented, human-readable rendering of a parsed script.
//!
//! ```text
//! Program:
//!   Block:
//!     ImageDeclaration: $img = "a.png"
//!     Rotate: $img LEFT
//! ```

use std::fmt::{self, Write};

use crate::processor::ast::*;

/// Render `program` as the indented tree shown above.
pub fn print(program: &Program) -> String {
    Pretty(program).to_string()
}

/// `Display` adapter over a whole program.
pub struct Pretty<'a>(pub &'a Program);

impl fmt::Display for Pretty<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer { out: f, indent: 0 };
        printer.program(self.0)
    }
}

/// Uppercase Debug name of a unit-variant enum: `Sharpen` → `SHARPEN`.
fn upper(value: impl fmt::Debug) -> String {
    format!("{value:?}").to_uppercase()
}

struct Printer<'a, W: Write> {
    out: &'a mut W,
    indent: usize,
}

impl<W: Write> Printer<'_, W> {
    fn pad(&mut self) -> fmt::Result {
        write!(self.out, "{:width$}", "", width = self.indent * 2)
    }

    fn line(&mut self, text: fmt::Arguments<'_>) -> fmt::Result {
        self.pad()?;
        self.out.write_fmt(text)?;
        self.out.write_char('\n')
    }

    fn nested(&mut self, block: &Block) -> fmt::Result {
        self.indent += 1;
        let result = self.block(block);
        self.indent -= 1;
        result
    }

    fn program(&mut self, program: &Program) -> fmt::Result {
        self.line(format_args!("Program:"))?;
        self.indent += 1;
        for block in &program.blocks {
            self.block(block)?;
        }
        self.indent -= 1;
        Ok(())
    }

    fn block(&mut self, block: &Block) -> fmt::Result {
        self.line(format_args!("Block:"))?;
        self.indent += 1;
        for stmt in &block.statements {
            self.stmt(stmt)?;
        }
        self.indent -= 1;
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> fmt::Result {
        match stmt {
            Stmt::BatchDeclaration { name, expr } => {
                self.line(format_args!("BatchDeclaration: {name} = {}", ExprText(expr)))
            }
            Stmt::ImageDeclaration { name, path } => {
                self.line(format_args!("ImageDeclaration: {name} = \"{path}\""))
            }
            Stmt::VariableDeclaration {
                ty,
                name,
                initializer,
            } => match initializer {
                Some(expr) => self.line(format_args!(
                    "VariableDeclaration: {ty} {name} = {}",
                    ExprText(expr)
                )),
                None => self.line(format_args!("VariableDeclaration: {ty} {name}")),
            },
            Stmt::Assignment { name, value } => {
                self.line(format_args!("Assignment: {name} = {}", ExprText(value)))
            }
            Stmt::ForEach {
                var,
                batch,
                export_path,
                body,
            } => {
                self.line(format_args!(
                    "ForEach: {var} in {batch} EXPORT TO \"{export_path}\""
                ))?;
                self.nested(body)
            }
            Stmt::If {
                condition,
                then_branch,
                elif_branches,
                else_branch,
            } => {
                self.line(format_args!("If: {}", ExprText(condition)))?;
                self.nested(then_branch)?;
                for branch in elif_branches {
                    self.line(format_args!("Elif: {}", ExprText(&branch.condition)))?;
                    self.nested(&branch.body)?;
                }
                if let Some(block) = else_branch {
                    self.line(format_args!("Else:"))?;
                    self.nested(block)?;
                }
                Ok(())
            }
            Stmt::Filter { image, filter } => {
                self.line(format_args!("SetFilter: {image} {}", upper(filter)))
            }
            Stmt::Hue { image, degrees } => self.line(format_args!("Hue: {image} {degrees}")),
            Stmt::Adjust {
                image,
                adjustment,
                amount,
            } => self.line(format_args!("{}: {image} {amount}", adjustment.name())),
            Stmt::Rotate { image, direction } => {
                self.line(format_args!("Rotate: {image} {}", upper(direction)))
            }
            Stmt::Crop {
                image,
                width,
                height,
            } => self.line(format_args!(
                "Crop: {image} ({}, {})",
                ExprText(width),
                ExprText(height)
            )),
            Stmt::Orientation { image, orientation } => {
                self.line(format_args!("Orientation: {image} {}", upper(orientation)))
            }
            Stmt::Watermark { image, text, color } => self.line(format_args!(
                "Watermark: {image} \"{text}\" {}",
                color.literal
            )),
            Stmt::ImageWatermark {
                image,
                watermark,
                transparency,
            } => self.line(format_args!(
                "ImageWatermark: {image} with {watermark}, transparency: {transparency}"
            )),
            Stmt::StripMetadata { image, selection } => match selection {
                StripSelection::All => self.line(format_args!("StripMetadata: {image} ALL")),
                StripSelection::Fields(fields) => {
                    let names: Vec<String> = fields.iter().map(ToString::to_string).collect();
                    self.line(format_args!("StripMetadata: {image} {}", names.join(", ")))
                }
            },
            Stmt::AddMetadata {
                image,
                field,
                value,
            } => self.line(format_args!("AddMetadata: {image} {field} \"{value}\"")),
            Stmt::Rename { image, terms } => {
                let terms: Vec<String> = terms
                    .iter()
                    .map(|term| match term {
                        RenameTerm::Text(text) => format!("\"{text}\""),
                        RenameTerm::Counter => "COUNTER".to_string(),
                        RenameTerm::FileName(image) => format!("METADATA {image} FNAME"),
                    })
                    .collect();
                self.line(format_args!("Rename: {image} to {}", terms.join(" + ")))
            }
            Stmt::Export {
                image,
                destination,
                keep_original,
            } => self.line(format_args!(
                "Export: {image} to \"{destination}\" {}",
                if *keep_original { "OGKEEP" } else { "OGDELETE" }
            )),
            Stmt::Convert { image, format } => {
                self.line(format_args!("Convert: {image} to {format}"))
            }
            Stmt::Resize { image, spec } => match spec {
                ResizeSpec::Aspect(ratio) => self.line(format_args!("Resize: {image} to {ratio}")),
                ResizeSpec::Resolution {
                    width,
                    height,
                    keep_aspect,
                } => self.line(format_args!(
                    "Resize: {image} to ({}, {}){}",
                    ExprText(width),
                    ExprText(height),
                    if *keep_aspect { "" } else { " RATIOFALSE" }
                )),
            },
            Stmt::Compress { image, quality } => {
                self.line(format_args!("Compress: {image} quality: {quality}"))
            }
            Stmt::Quantize { image, colors } => {
                self.line(format_args!("Quantize: {image} colors: {colors}"))
            }
            Stmt::WebOptimize { image, mode } => match mode {
                WebOptimizeMode::Lossless => {
                    self.line(format_args!("WebOptimize: {image} LOSSLESS"))
                }
                WebOptimizeMode::Lossy(quality) => self.line(format_args!(
                    "WebOptimize: {image} LOSSY quality: {quality}"
                )),
            },
        }
    }
}

/// Inline rendering of an expression. Binary expressions are fully
/// parenthesised.
struct ExprText<'a>(&'a Expr);

impl fmt::Display for ExprText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Expr::Literal(lit) => match lit {
                Literal::Int(i) => write!(f, "{i}"),
                Literal::Double(d) => write!(f, "{d}"),
                Literal::Str(s) => write!(f, "\"{s}\""),
                Literal::Bool(b) => write!(f, "{b}"),
                Literal::Pixels(p) => write!(f, "{p}p"),
            },
            Expr::Variable(name) => f.write_str(name),
            Expr::Binary { left, op, right } => {
                write!(f, "({} {op} {})", ExprText(left), ExprText(right))
            }
            Expr::Metadata { image, kind } => write!(f, "METADATA {image} {kind}"),
            Expr::Batch(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" + ")?;
                    }
                    write!(f, "{}", ExprText(term))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{lexer::tokenize, script_parser::parse};

    fn render(src: &str) -> String {
        print(&parse(tokenize(src).unwrap()).unwrap())
    }

    #[test]
    fn test_statement_lines() {
        let prelude = r#"IMG $img = "a.png"; IMG $logo = "l.png"; "#;
        let test_cases = vec![
            ("ROTATE $img LEFT;", "Rotate: $img LEFT"),
            ("SET $img BW;", "SetFilter: $img BW"),
            ("SET $img HUE 90;", "Hue: $img 90"),
            ("SET $img PIXELATE 12;", "Pixelate: $img 12"),
            ("CROP $img (100, 50p);", "Crop: $img (100, 50p)"),
            ("ORIENTATION $img PORTRAIT;", "Orientation: $img PORTRAIT"),
            (
                r#"WATERMARK $img "hi" ~HFF0000~;"#,
                r#"Watermark: $img "hi" ~HFF0000~"#,
            ),
            (
                "WATERMARK $img $logo 128;",
                "ImageWatermark: $img with $logo, transparency: 128",
            ),
            ("STRIP METADATA $img GPS, CAMERA;", "StripMetadata: $img GPS, CAMERA"),
            ("STRIP METADATA $img ALL;", "StripMetadata: $img ALL"),
            (
                r#"ADD METADATA $img TITLE "t";"#,
                r#"AddMetadata: $img TITLE "t""#,
            ),
            (
                r#"RENAME $img "p_" + COUNTER + METADATA $img FNAME;"#,
                r#"Rename: $img to "p_" + COUNTER + METADATA $img FNAME"#,
            ),
            (
                r#"EXPORT $img TO "out/" OGDELETE;"#,
                r#"Export: $img to "out/" OGDELETE"#,
            ),
            ("CONVERT $img TO WEBP;", "Convert: $img to WEBP"),
            ("RESIZE $img 16:9;", "Resize: $img to 16:9"),
            (
                "RESIZE $img (640, 480) RATIOFALSE;",
                "Resize: $img to (640, 480) RATIOFALSE",
            ),
            ("COMPRESS $img 70;", "Compress: $img quality: 70"),
            ("QUANTIZE $img 16;", "Quantize: $img colors: 16"),
            ("WEBOPTIMIZE $img LOSSY 60;", "WebOptimize: $img LOSSY quality: 60"),
            ("WEBOPTIMIZE $img LOSSLESS;", "WebOptimize: $img LOSSLESS"),
        ];

        for (src, expected) in test_cases {
            let out = render(&format!("{{ {prelude}{src} }}"));
            let last = out.lines().last().unwrap();
            assert_eq!(last.trim_start(), expected, "source: {src}");
        }
    }

    #[test]
    fn test_nested_layout() {
        let src = r#"{
            BATCH #b = "in" + "more";
            INT $n = 2 + 3 * 4;
            FOREACH IMG $p IN #b EXPORT TO "out" {
                IF METADATA $p FWIDTH > 100 { ROTATE $p RIGHT; }
                ELIF $n == 1 { SET $p SEPIA; }
                ELSE { STRING $s; }
            }
        }"#;
        let expected = "\
Program:
  Block:
    BatchDeclaration: #b = \"in\" + \"more\"
    VariableDeclaration: INT $n = (2 + (3 * 4))
    ForEach: $p in #b EXPORT TO \"out\"
      Block:
        If: (METADATA $p FWIDTH > 100)
          Block:
            Rotate: $p RIGHT
        Elif: ($n == 1)
          Block:
            SetFilter: $p SEPIA
        Else:
          Block:
            VariableDeclaration: STRING $s
";
        assert_eq!(render(src), expected);
    }
}
