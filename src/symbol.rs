//! Helpers for kernel symbol strings of the form `name [module]`, as
//! reported by `available_filter_functions`, `kallsyms`, and the kprobe
//! blacklist.

/// Check whether `symbol` carries a trailing module qualifier.
#[inline]
pub fn symbol_has_module(symbol: &str) -> bool {
    symbol.ends_with(']')
}

/// Split `name [module]` into its name and module parts.
///
/// Symbols without a well-formed module suffix are reported unchanged,
/// along with an empty module.
pub fn split_symbol_module(symbol: &str) -> (&str, &str) {
    if !symbol_has_module(symbol) {
        return (symbol, "")
    }

    match symbol.rfind(" [") {
        Some(idx) => (&symbol[..idx], &symbol[idx + 2..symbol.len() - 1]),
        None => (symbol, ""),
    }
}

/// Split a kprobe blacklist line of the form
/// `<start>-<end>\t<name>[ [<module>]]` into its address range, name,
/// and module parts.
///
/// `None` is returned if the line lacks the tab separating the address
/// range from the name.
pub fn split_addrrange_symbol_module(line: &str) -> Option<(&str, &str, &str)> {
    let (range, rest) = line.rsplit_once('\t')?;
    let (name, module) = match rest.rfind(" [") {
        Some(idx) if symbol_has_module(rest) => (&rest[..idx], &rest[idx + 2..rest.len() - 1]),
        _ => (rest, ""),
    };
    Some((range, name, module))
}
