//! Font discovery for report rendering.
//!
//! A bundled Roboto family is searched first, in this order: the directory named by
//! `CALIB_REPORT_FONTS_DIR`, `assets/fonts` next to the running executable, and
//! `assets/fonts` inside this crate. When none of them holds the full family, well-known
//! system families are tried (Arial on Windows, Liberation Sans on Linux).

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use genpdf::error::{Error, ErrorKind};
use genpdf::fonts::{FontData, FontFamily};
use log::{debug, warn};

/// Environment variable overriding the bundled font directory.
pub const FONTS_DIR_ENV: &str = "CALIB_REPORT_FONTS_DIR";

/// Environment variable overriding the system font directory used for fallbacks.
pub const SYSTEM_FONTS_DIR_ENV: &str = "CALIB_REPORT_SYSTEM_FONTS_DIR";

/// Name of the bundled font family.
pub const BUNDLED_FAMILY_NAME: &str = "Roboto";

/// File names of one font family, per style.
struct FamilyFiles {
    name: &'static str,
    regular: &'static str,
    bold: &'static str,
    italic: &'static str,
    bold_italic: &'static str,
}

impl FamilyFiles {
    fn all(&self) -> [(&'static str, &'static str); 4] {
        [
            ("regular", self.regular),
            ("bold", self.bold),
            ("italic", self.italic),
            ("bold italic", self.bold_italic),
        ]
    }

    fn missing_in(&self, directory: &Path) -> Vec<&'static str> {
        self.all()
            .iter()
            .map(|(_, file)| *file)
            .filter(|file| !directory.join(file).is_file())
            .collect()
    }

    fn load(&self, directory: &Path) -> Result<FontFamily<FontData>, Error> {
        Ok(FontFamily {
            regular: load_font(directory, self.regular)?,
            bold: load_font(directory, self.bold)?,
            italic: load_font(directory, self.italic)?,
            bold_italic: load_font(directory, self.bold_italic)?,
        })
    }
}

const BUNDLED: FamilyFiles = FamilyFiles {
    name: BUNDLED_FAMILY_NAME,
    regular: "Roboto-Regular.ttf",
    bold: "Roboto-Bold.ttf",
    italic: "Roboto-Italic.ttf",
    bold_italic: "Roboto-BoldItalic.ttf",
};

const ARIAL: FamilyFiles = FamilyFiles {
    name: "Arial",
    regular: "arial.ttf",
    bold: "arialbd.ttf",
    italic: "ariali.ttf",
    bold_italic: "arialbi.ttf",
};

const LIBERATION_SANS: FamilyFiles = FamilyFiles {
    name: "Liberation Sans",
    regular: "LiberationSans-Regular.ttf",
    bold: "LiberationSans-Bold.ttf",
    italic: "LiberationSans-Italic.ttf",
    bold_italic: "LiberationSans-BoldItalic.ttf",
};

const LINUX_FONT_DIRS: &[&str] = &[
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/truetype/liberation2",
    "/usr/share/fonts/liberation-sans",
    "/usr/share/fonts/liberation",
];

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
}

/// Directory holding the fonts that ship with this crate.
pub fn bundled_fonts_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts")
}

fn bundled_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let mut push = |candidate: PathBuf| {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    if let Some(path) = env_path(FONTS_DIR_ENV) {
        push(path);
    }
    if let Some(bin_dir) = env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        push(bin_dir.join("assets/fonts"));
    }
    push(bundled_fonts_dir());

    candidates
}

fn system_candidates() -> Vec<(PathBuf, &'static FamilyFiles)> {
    if let Some(path) = env_path(SYSTEM_FONTS_DIR_ENV) {
        return vec![(path.clone(), &ARIAL), (path, &LIBERATION_SANS)];
    }

    let mut candidates = Vec::new();
    for var in ["WINDIR", "SystemRoot"] {
        if let Some(root) = env_path(var) {
            candidates.push((root.join("Fonts"), &ARIAL));
        }
    }
    candidates.extend(
        LINUX_FONT_DIRS
            .iter()
            .map(|dir| (PathBuf::from(dir), &LIBERATION_SANS)),
    );
    candidates
}

fn load_font(directory: &Path, file: &str) -> Result<FontData, Error> {
    let path = directory.join(file);
    FontData::load(&path, None).map_err(|err| {
        Error::new(
            format!("Failed to load font {}: {}", path.display(), err),
            io::Error::new(io::ErrorKind::Other, err.to_string()),
        )
    })
}

fn not_found(message: String) -> Error {
    Error::new(
        message,
        io::Error::new(io::ErrorKind::NotFound, "report fonts not found"),
    )
}

fn find_bundled() -> Result<PathBuf, Vec<String>> {
    let mut attempts = Vec::new();
    for candidate in bundled_candidates() {
        if !candidate.is_dir() {
            attempts.push(format!("{} (directory missing)", candidate.display()));
            continue;
        }
        let missing = BUNDLED.missing_in(&candidate);
        if missing.is_empty() {
            return Ok(candidate);
        }
        attempts.push(format!(
            "{} (missing [{}])",
            candidate.display(),
            missing.join(", ")
        ));
    }
    Err(attempts)
}

fn find_system() -> Option<(PathBuf, &'static FamilyFiles)> {
    system_candidates()
        .into_iter()
        .find(|(directory, family)| directory.is_dir() && family.missing_in(directory).is_empty())
}

/// Returns the font family used for reports.
///
/// Fails with an [`ErrorKind::IoError`] of kind `NotFound` when neither the bundled family nor a
/// system fallback is available.
pub fn report_font_family() -> Result<FontFamily<FontData>, Error> {
    match find_bundled() {
        Ok(directory) => {
            debug!("Loading {} fonts from {}", BUNDLED.name, directory.display());
            BUNDLED.load(&directory)
        }
        Err(attempts) => match find_system() {
            Some((directory, family)) => {
                warn!(
                    "Bundled {} fonts unavailable; using {} from {}",
                    BUNDLED.name,
                    family.name,
                    directory.display()
                );
                family.load(&directory)
            }
            None => Err(not_found(format!(
                "No report fonts found. Checked: {}. Set {} to a directory with the {} family.",
                if attempts.is_empty() {
                    "nothing".to_string()
                } else {
                    attempts.join(", ")
                },
                FONTS_DIR_ENV,
                BUNDLED.name
            ))),
        },
    }
}

/// Indicates whether [`report_font_family`] can find a usable family.
pub fn fonts_available() -> bool {
    find_bundled().is_ok() || find_system().is_some()
}

/// Returns whether `err` means that no fonts were found, as opposed to unreadable font files.
pub fn is_missing_fonts(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::IoError(io_err) if io_err.kind() == io::ErrorKind::NotFound
    )
}
