/// Reduces a subject or student name to the form every comparison uses.
///
/// Lowercases, folds accented Latin letters through a fixed table, keeps only
/// alphanumerics, spaces and commas, and collapses runs of whitespace.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        let c = fold_char(ch);
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !(c.is_alphanumeric() || c == ',') {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        for lower in c.to_lowercase() {
            out.push(lower);
        }
    }
    out
}

fn fold_char(ch: char) -> char {
    match ch {
        'Á' | 'À' | 'Ä' | 'Â' | 'Ã' | 'Å' | 'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' => 'a',
        'É' | 'È' | 'Ë' | 'Ê' | 'é' | 'è' | 'ë' | 'ê' => 'e',
        'Í' | 'Ì' | 'Ï' | 'Î' | 'í' | 'ì' | 'ï' | 'î' => 'i',
        'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' | 'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'Ú' | 'Ù' | 'Ü' | 'Û' | 'ú' | 'ù' | 'ü' | 'û' => 'u',
        'Ñ' | 'ñ' => 'n',
        'Ç' | 'ç' => 'c',
        'Ý' | 'ý' | 'ÿ' => 'y',
        // Exports sometimes carry non-breaking spaces between name parts.
        '\u{a0}' => ' ',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_and_accents() {
        assert_eq!(normalize("García, JUAN"), "garcia, juan");
        assert_eq!(normalize("Educación Física"), "educacion fisica");
        assert_eq!(normalize("Peña Ñandú"), "pena nandu");
    }

    #[test]
    fn strips_punctuation_but_keeps_commas() {
        assert_eq!(normalize("O'Connor-Díaz, M."), "oconnordiaz, m");
        assert_eq!(normalize("Lengua y Literatura (I)"), "lengua y literatura i");
    }

    #[test]
    fn collapses_and_trims_whitespace() {
        assert_eq!(normalize("  juan \t  carlos\u{a0}\u{a0}perez  "), "juan carlos perez");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn punctuation_between_words_does_not_glue_them() {
        assert_eq!(normalize("juan - perez"), "juan perez");
    }
}
