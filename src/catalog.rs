// Subject code tables, one per academic year. Export file names carry the code
// in parentheses; the same code means a different subject in each year.

pub const FIRST_YEAR: u8 = 1;
pub const LAST_YEAR: u8 = 7;

static YEAR_1: &[(u32, &str)] = &[
    (1, "Lengua y Literatura"),
    (2, "Matemática"),
    (3, "Ciencias Naturales"),
    (4, "Ciencias Sociales"),
    (5, "Inglés"),
    (6, "Educación Física"),
    (7, "Educación Artística"),
    (8, "Construcción de Ciudadanía"),
    (9, "Educación Tecnológica"),
    (10, "Dibujo Técnico"),
    (11, "Taller"),
];

static YEAR_2: &[(u32, &str)] = &[
    (1, "Lengua y Literatura"),
    (2, "Matemática"),
    (3, "Biología"),
    (4, "Historia"),
    (5, "Geografía"),
    (6, "Inglés"),
    (7, "Educación Física"),
    (8, "Físico Química"),
    (9, "Construcción de Ciudadanía"),
    (10, "Educación Artística"),
    (11, "Dibujo Técnico"),
    (12, "Taller"),
];

static YEAR_3: &[(u32, &str)] = &[
    (1, "Prácticas del Lenguaje"),
    (2, "Matemática"),
    (3, "Biología"),
    (4, "Historia"),
    (5, "Geografía"),
    (6, "Inglés"),
    (7, "Educación Física"),
    (8, "Físico Química"),
    (9, "Construcción de Ciudadanía"),
    (10, "Educación Artística"),
    (11, "Tecnología de la Representación"),
    (12, "Taller"),
];

static YEAR_4: &[(u32, &str)] = &[
    (1, "Literatura"),
    (2, "Inglés"),
    (3, "Educación Física"),
    (4, "Salud y Adolescencia"),
    (5, "Historia"),
    (6, "Geografía"),
    (7, "Matemática"),
    (8, "Física"),
    (9, "Química"),
    (10, "Tecnologías de la Información"),
    (11, "Laboratorio de Mediciones Eléctricas"),
    (12, "Taller"),
];

static YEAR_5: &[(u32, &str)] = &[
    (1, "Literatura"),
    (2, "Inglés"),
    (3, "Educación Física"),
    (4, "Política y Ciudadanía"),
    (5, "Historia"),
    (6, "Geografía"),
    (7, "Análisis Matemático"),
    (8, "Mecánica y Mecanismos"),
    (9, "Resistencia y Ensayo de Materiales"),
    (10, "Química Aplicada"),
    (11, "Electrotecnia"),
    (12, "Taller"),
];

static YEAR_6: &[(u32, &str)] = &[
    (1, "Literatura"),
    (2, "Inglés"),
    (3, "Educación Física"),
    (4, "Filosofía"),
    (5, "Arte"),
    (6, "Matemática Aplicada"),
    (7, "Derechos del Trabajo"),
    (8, "Termodinámica y Máquinas Térmicas"),
    (9, "Sistemas Mecánicos"),
    (10, "Electrónica"),
    (11, "Diseño y Procesamiento Mecánico"),
    (12, "Taller"),
];

static YEAR_7: &[(u32, &str)] = &[
    (1, "Prácticas Profesionalizantes"),
    (2, "Emprendimientos Productivos"),
    (3, "Electrónica Industrial"),
    (4, "Seguridad, Higiene y Protección del Medio Ambiente"),
    (5, "Máquinas Eléctricas"),
    (6, "Sistemas de Control"),
    (7, "Proyecto de Instalaciones"),
    (8, "Mantenimiento Industrial"),
    (9, "Organización Industrial"),
    (10, "Taller"),
];

/// Code table for one academic year; empty when the year is out of range.
pub fn entries(year: u8) -> &'static [(u32, &'static str)] {
    match year {
        1 => YEAR_1,
        2 => YEAR_2,
        3 => YEAR_3,
        4 => YEAR_4,
        5 => YEAR_5,
        6 => YEAR_6,
        7 => YEAR_7,
        _ => &[],
    }
}

/// Canonical subject name for `code` in `year`.
pub fn resolve(year: u8, code: u32) -> Option<&'static str> {
    entries(year)
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

pub fn is_valid_year(year: i64) -> bool {
    (FIRST_YEAR as i64..=LAST_YEAR as i64).contains(&year)
}
