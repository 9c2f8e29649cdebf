//! Line-buffered C text sink.
//!
//! Tracks indentation and brace-delimited blocks so statement generation can
//! stay oblivious to layout. Output depends only on the sequence of calls,
//! never on prior state, so repeated generation is byte-identical.

use crate::common::source::SourceLocation;

const INDENT: &str = "  ";

#[derive(Debug, Default)]
pub struct CodeWriter {
    buf: String,
    depth: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one indented line followed by a newline.
    pub fn write_line(&mut self, line: &str) {
        for _ in 0..self.depth {
            self.buf.push_str(INDENT);
        }
        self.buf.push_str(line);
        self.buf.push('\n');
    }

    /// Write a source-location comment ahead of an executable statement.
    pub fn write_location(&mut self, loc: &SourceLocation) {
        self.write_line(&format!("/* {loc} */"));
    }

    /// Write `header {`, run `f` one level deeper, then close the brace.
    pub fn block(&mut self, header: &str, f: impl FnOnce(&mut Self)) {
        self.write_line(&format!("{header} {{"));
        self.depth += 1;
        f(self);
        self.depth -= 1;
        self.write_line("}");
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_indent_and_close() {
        let mut w = CodeWriter::new();
        w.block("while (1)", |w| {
            w.write_line("x = 1;");
            w.block("if (x)", |w| w.write_line("y = 2;"));
        });
        assert_eq!(
            w.finish(),
            "while (1) {\n  x = 1;\n  if (x) {\n    y = 2;\n  }\n}\n"
        );
    }

    #[test]
    fn location_comments() {
        let mut w = CodeWriter::new();
        w.write_location(&SourceLocation::new("a.rbx", 7));
        assert_eq!(w.finish(), "/* a.rbx:7 */\n");
    }
}
