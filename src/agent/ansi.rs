use once_cell::sync::Lazy;
use regex::Regex;

/// CSI sequences (`ESC [ ... final`), OSC sequences (`ESC ] ... BEL|ST`) and
/// lone two-byte escapes.
static RE_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][0-9A-Za-z]|\x1b[=>78NOM]")
        .unwrap()
});

/// The symbolic form some multiplexers emit when the escape byte is rendered
/// as text (`\e[...m`, `^[[...m`, `\033[...m`, `\x1b[...m`, `\u001b[...m`).
static RE_SYMBOLIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\\e|\^\[|\\033|\\x1[bB]|\\u001[bB])\[[0-9;?]*[ -/]*[@-~]").unwrap()
});

/// SGR fragments that lost their escape byte, e.g. `[38;5;245m` or `[0m`.
/// Only digits and semicolons followed by `m` qualify, so `[A] option` and
/// `[y/n]` survive.
static RE_ORPHANED_SGR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[0-9;]+m").unwrap());

/// Remove terminal control sequences in both their canonical and symbolic
/// forms. Printable bracketed text is left alone.
pub fn strip(text: &str) -> String {
    if !text.contains('\x1b') && !text.contains('\\') && !text.contains("^[") {
        return text.to_string();
    }
    let canonical = RE_ESCAPE.replace_all(text, "");
    RE_SYMBOLIC.replace_all(&canonical, "").into_owned()
}

/// Like [`strip`], but also drops SGR fragments whose escape byte was cut
/// off by a buffering boundary.
pub fn strip_orphaned(text: &str) -> String {
    let stripped = strip(text);
    RE_ORPHANED_SGR.replace_all(&stripped, "").into_owned()
}
