use phf::phf_map;

// H through Kr, the common heavy main-group elements, and a handful of late
// transition metals. Fingerprinting only needs the species that occur in
// practice in thermochemistry work.
static SYMBOL_TO_ATOMIC_NUMBER: phf::Map<&'static str, u32> = phf_map! {
    "H" => 1, "He" => 2,
    "Li" => 3, "Be" => 4, "B" => 5, "C" => 6, "N" => 7, "O" => 8, "F" => 9, "Ne" => 10,
    "Na" => 11, "Mg" => 12, "Al" => 13, "Si" => 14, "P" => 15, "S" => 16, "Cl" => 17, "Ar" => 18,
    "K" => 19, "Ca" => 20, "Sc" => 21, "Ti" => 22, "V" => 23, "Cr" => 24, "Mn" => 25,
    "Fe" => 26, "Co" => 27, "Ni" => 28, "Cu" => 29, "Zn" => 30,
    "Ga" => 31, "Ge" => 32, "As" => 33, "Se" => 34, "Br" => 35, "Kr" => 36,
    "Rb" => 37, "Sr" => 38, "Mo" => 42, "Ru" => 44, "Rh" => 45, "Pd" => 46, "Ag" => 47,
    "Cd" => 48, "In" => 49, "Sn" => 50, "Sb" => 51, "Te" => 52, "I" => 53, "Xe" => 54,
    "Cs" => 55, "Ba" => 56, "W" => 74, "Pt" => 78, "Au" => 79, "Hg" => 80, "Pb" => 82,
};

/// Case-insensitive lookup, so geometries read back from external program
/// output do not need to be normalized by the caller.
pub fn atomic_number(symbol: &str) -> Option<u32> {
    let canonical = canonicalize(symbol)?;
    SYMBOL_TO_ATOMIC_NUMBER.get(canonical.as_str()).copied()
}

pub fn is_known_element(symbol: &str) -> bool {
    atomic_number(symbol).is_some()
}

fn canonicalize(symbol: &str) -> Option<String> {
    let symbol = symbol.trim();
    if symbol.is_empty() || symbol.len() > 2 || !symbol.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut chars = symbol.chars();
    let head = chars.next()?.to_ascii_uppercase();
    let tail: String = chars.map(|c| c.to_ascii_lowercase()).collect();
    Some(format!("{}{}", head, tail))
}
