//! Descriptors as a CommonJS bundler config module.
//!
//! The writer produces what the bundler loads directly: `entry` and
//! `output.path` go through `path.resolve(__dirname, ..)` and rule conditions
//! are regular expressions, not strings. The reader accepts that output and
//! hand-written configs in the same shape (comments, single quotes, trailing
//! commas).

use crate::app::models::{ConfigurationDescriptor, Pattern};
use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

const PRELUDE: &str = "const path = require('path');\n\n";
const EXPORTS: &str = "module.exports";

pub fn render(descriptor: &ConfigurationDescriptor) -> Result<String> {
    let output = descriptor.output();
    let mut out = String::from(PRELUDE);

    out.push_str("module.exports = {\n");
    out.push_str(&format!("  entry: {},\n", resolved(descriptor.entry())?));
    out.push_str("  output: {\n");
    out.push_str(&format!("    path: {},\n", resolved(&output.path)?));
    out.push_str(&format!("    filename: {},\n", js_string(&output.filename)?));
    out.push_str("  },\n");
    out.push_str("  module: {\n");

    if descriptor.rules().is_empty() {
        out.push_str("    rules: [],\n");
    } else {
        out.push_str("    rules: [\n");
        for rule in descriptor.rules() {
            let presets = rule
                .handler
                .options
                .presets
                .iter()
                .map(|p| js_string(p))
                .collect::<Result<Vec<_>>>()?;

            out.push_str("      {\n");
            out.push_str(&format!("        test: {},\n", regex_expr(&rule.test)?));
            if let Some(exclude) = &rule.exclude {
                out.push_str(&format!("        exclude: {},\n", regex_expr(exclude)?));
            }
            out.push_str("        use: {\n");
            out.push_str(&format!("          loader: {},\n", js_string(&rule.handler.loader)?));
            out.push_str("          options: {\n");
            out.push_str(&format!("            presets: [{}],\n", presets.join(", ")));
            out.push_str("          },\n");
            out.push_str("        },\n");
            out.push_str("      },\n");
        }
        out.push_str("    ],\n");
    }

    out.push_str("  },\n");
    out.push_str("};\n");
    Ok(out)
}

pub fn parse(text: &str) -> Result<ConfigurationDescriptor> {
    let start = text
        .find(EXPORTS)
        .context("CommonJS descriptor must assign `module.exports`")?;

    let mut reader = Reader {
        src: text,
        pos: start + EXPORTS.len(),
    };
    reader.expect("=")?;
    let value = reader.value()?;

    serde_json::from_value(value).context("CommonJS descriptor does not match the config schema")
}

fn js_string(s: &str) -> Result<String> {
    serde_json::to_string(s).context("Failed to encode string literal")
}

fn resolved(path: &str) -> Result<String> {
    Ok(format!("path.resolve(__dirname, {})", js_string(path)?))
}

/// A `/.../` literal when the source can be written verbatim between
/// slashes, `new RegExp("...")` otherwise.
fn regex_expr(pattern: &Pattern) -> Result<String> {
    let source = pattern.as_str();
    let trailing_backslashes = source.chars().rev().take_while(|&c| c == '\\').count();

    let literal_safe = !source.starts_with('*')
        && !source.contains(['/', '\n', '\r'])
        && trailing_backslashes % 2 == 0;

    if literal_safe {
        Ok(format!("/{}/", source))
    } else {
        Ok(format!("new RegExp({})", js_string(source)?))
    }
}

/// Recursive-descent reader for the object-literal subset a config uses.
struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();

            if trimmed.starts_with("//") {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else if trimmed.starts_with("/*") {
                self.pos += trimmed.find("*/").map_or(trimmed.len(), |end| end + 2);
            } else {
                break;
            }
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_trivia();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if !self.eat(token) {
            bail!("expected `{}` at byte {}", token, self.pos);
        }
        Ok(())
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_trivia();
        match self.peek() {
            Some('{') => self.object(),
            Some('[') => self.array(),
            Some('"') | Some('\'') => Ok(Value::String(self.string()?)),
            Some('/') => Ok(Value::String(self.regex_literal()?)),
            Some(c) if is_ident_char(c) => self.call_expr(),
            Some(c) => bail!("unexpected `{}` at byte {}", c, self.pos),
            None => bail!("unexpected end of input"),
        }
    }

    fn object(&mut self) -> Result<Value> {
        self.expect("{")?;
        let mut map = Map::new();
        loop {
            if self.eat("}") {
                break;
            }
            self.skip_trivia();
            let key = match self.peek() {
                Some('"') | Some('\'') => self.string()?,
                _ => self.identifier()?,
            };
            self.expect(":")?;
            let value = self.value()?;
            map.insert(key, value);

            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        Ok(Value::Object(map))
    }

    fn array(&mut self) -> Result<Value> {
        self.expect("[")?;
        let mut items = Vec::new();
        loop {
            if self.eat("]") {
                break;
            }
            items.push(self.value()?);

            if !self.eat(",") {
                self.expect("]")?;
                break;
            }
        }
        Ok(Value::Array(items))
    }

    fn identifier(&mut self) -> Result<String> {
        self.skip_trivia();
        let rest = self.rest();
        let len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        if len == 0 {
            bail!("expected an identifier at byte {}", self.pos);
        }
        self.pos += len;
        Ok(rest[..len].to_string())
    }

    /// `path.resolve(__dirname, "...")`, `path.join(__dirname, "...")` or
    /// `new RegExp("...")`; each reads back as its string argument.
    fn call_expr(&mut self) -> Result<Value> {
        let start = self.pos;
        let callee = self.identifier()?;
        match callee.as_str() {
            "path.resolve" | "path.join" => {
                self.expect("(")?;
                let base = self.identifier()?;
                if base != "__dirname" {
                    bail!("`{}` must be relative to __dirname, got `{}`", callee, base);
                }
                self.expect(",")?;
                self.skip_trivia();
                let path = self.string()?;
                self.eat(",");
                self.expect(")")?;
                Ok(Value::String(path))
            }
            "new" => {
                let class = self.identifier()?;
                if class != "RegExp" {
                    bail!("unsupported constructor `{}` at byte {}", class, start);
                }
                self.expect("(")?;
                self.skip_trivia();
                let source = self.string()?;
                self.expect(")")?;
                Ok(Value::String(source))
            }
            other => bail!("unsupported expression `{}` at byte {}", other, start),
        }
    }

    fn string(&mut self) -> Result<String> {
        let start = self.pos;
        let mut chars = self.rest().char_indices();
        let quote = match chars.next() {
            Some((_, q @ ('"' | '\''))) => q,
            _ => bail!("expected a string at byte {}", start),
        };

        let mut out = String::new();
        while let Some((idx, ch)) = chars.next() {
            match ch {
                c if c == quote => {
                    self.pos += idx + c.len_utf8();
                    return Ok(out);
                }
                '\\' => {
                    let (_, escaped) = chars
                        .next()
                        .context(format!("unterminated string at byte {}", start))?;
                    match escaped {
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        'u' => {
                            let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                            let code = u32::from_str_radix(&hex, 16)
                                .context(format!("bad \\u escape at byte {}", start))?;
                            let decoded = char::from_u32(code)
                                .context(format!("unsupported \\u escape at byte {}", start))?;
                            out.push(decoded);
                        }
                        other => out.push(other),
                    }
                }
                '\n' => bail!("unterminated string at byte {}", start),
                c => out.push(c),
            }
        }
        bail!("unterminated string at byte {}", start)
    }

    /// Body of a `/.../` literal, verbatim. Flags are rejected since the
    /// descriptor has nowhere to keep them.
    fn regex_literal(&mut self) -> Result<String> {
        let start = self.pos;
        let mut chars = self.rest().char_indices().skip(1);
        let mut escaped = false;
        let mut in_class = false;

        while let Some((idx, ch)) = chars.next() {
            match ch {
                '\n' | '\r' => break,
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => {
                    let body = self.rest()[1..idx].to_string();
                    self.pos += idx + 1;
                    if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                        bail!("regex flags are not supported (literal at byte {})", start);
                    }
                    return Ok(body);
                }
                _ => {}
            }
        }
        bail!("unterminated regex literal at byte {}", start)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::default_rules;
    use crate::app::models::TransformRule;

    const HAND_WRITTEN: &str = r#"const path = require('path');

module.exports = {
  // where is the base of our app located
  entry: path.resolve(__dirname, 'src/index.jsx'),
  output: {
    // what we want our bundle to be called
    filename: 'bundle.js',
    // where we want our bundle to live
    path: path.resolve(__dirname, 'public'),
  },
  module: {
    rules: [
      {
        test: /\.jsx?$/,
        exclude: /(node_modules|bower_components)/,
        use: {
          loader: 'babel-loader',
          options: {
            presets: ['@babel/preset-env', '@babel/preset-react']
          }
        },
      }
    ],
  },
};
"#;

    fn babel_descriptor() -> ConfigurationDescriptor {
        ConfigurationDescriptor::construct("src/index.jsx", "public", "bundle.js", default_rules())
            .unwrap()
    }

    #[test]
    fn writes_regex_literals_and_resolved_paths() {
        let js = render(&babel_descriptor()).unwrap();

        assert!(js.starts_with("const path = require('path');\n"));
        assert!(js.contains(r#"entry: path.resolve(__dirname, "src/index.jsx"),"#));
        assert!(js.contains(r#"path: path.resolve(__dirname, "public"),"#));
        assert!(js.contains(r#"filename: "bundle.js","#));
        assert!(js.contains(r"test: /\.jsx?$/,"));
        assert!(js.contains("exclude: /(node_modules|bower_components)/,"));
        assert!(js.contains(r#"presets: ["@babel/preset-env", "@babel/preset-react"],"#));
        assert!(!js.contains(r#""\\.jsx?$""#));
    }

    #[test]
    fn reads_hand_written_config() {
        let parsed = parse(HAND_WRITTEN).unwrap();
        assert_eq!(parsed, babel_descriptor());
    }

    #[test]
    fn reads_back_its_own_output() {
        let descriptor = babel_descriptor();
        assert_eq!(parse(&render(&descriptor).unwrap()).unwrap(), descriptor);
    }

    #[test]
    fn awkward_patterns_fall_back_to_regexp_constructor() {
        let rules = vec![
            TransformRule::new(r"src/.*\.js$", None, "babel-loader", ["env"]),
            TransformRule::new("*.jsx?", Some(r"vendor\"), "babel-loader", ["env"]),
        ];
        let descriptor =
            ConfigurationDescriptor::construct("index.js", "dist", "main.js", rules).unwrap();

        let js = render(&descriptor).unwrap();
        assert!(js.contains(r#"test: new RegExp("src/.*\\.js$"),"#));
        assert!(js.contains(r#"test: new RegExp("*.jsx?"),"#));
        assert!(js.contains(r#"exclude: new RegExp("vendor\\"),"#));
        assert_eq!(parse(&js).unwrap(), descriptor);
    }

    #[test]
    fn empty_rules_render_as_empty_array() {
        let descriptor =
            ConfigurationDescriptor::construct("index.js", "dist", "main.js", Vec::new()).unwrap();
        let js = render(&descriptor).unwrap();

        assert!(js.contains("    rules: [],\n"));
        assert!(parse(&js).unwrap().rules().is_empty());
    }

    #[test]
    fn regex_flags_are_rejected() {
        let text = HAND_WRITTEN.replace(r"/\.jsx?$/,", r"/\.jsx?$/i,");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("flags"));
    }

    #[test]
    fn paths_must_be_relative_to_dirname() {
        let text = HAND_WRITTEN.replace(
            "path.resolve(__dirname, 'public')",
            "path.resolve(process.cwd(), 'public')",
        );
        assert!(parse(&text).is_err());
    }

    #[test]
    fn missing_exports_is_an_error() {
        let err = parse("const config = {};").unwrap_err();
        assert!(err.to_string().contains("module.exports"));
    }
}
