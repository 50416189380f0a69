//! Type expression tokenization.
//!
//! A type string is split on name-like runs; everything between them is
//! punctuation, so `Optional[List[~pkg.Widget]]` keeps each name navigable.

use once_cell::sync::Lazy;
use regex::Regex;

use super::TokenWriter;
use crate::nodes::NodeIndex;

static TYPE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"~?[a-zA-Z\d._]+").unwrap());

/// Write a type expression as punctuation and type-name tokens.
pub fn write_type(w: &mut TokenWriter, type_name: &str, nodes: &NodeIndex) {
    let mut last = 0;
    for m in TYPE_TOKEN.find_iter(type_name) {
        if m.start() > last {
            w.punct(&type_name[last..m.start()]);
        }
        last = m.end();

        let token = m.as_str();
        if token.chars().all(|c| c == '.') {
            w.punct(token);
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit() || c == '.') {
            w.value(token);
            continue;
        }
        match token.strip_prefix('~') {
            Some(qualified) => {
                let display = qualified.rsplit('.').next().unwrap_or(qualified);
                w.type_name(display, nodes.navigate_target(qualified));
            }
            None => w.type_name(token, nodes.navigate_target(token)),
        }
    }
    if last < type_name.len() {
        w.punct(&type_name[last..]);
    }
}
