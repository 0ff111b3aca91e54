use std::path::{Path, PathBuf};

/// Locations tools resolve user-supplied paths against.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Base directory for relative paths and shell commands
    pub workspace: PathBuf,

    /// The user's desktop directory, substituted for `~/Desktop`
    pub desktop: PathBuf,
}

impl ToolContext {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            desktop: default_desktop(),
        }
    }

    pub fn with_desktop(mut self, desktop: PathBuf) -> Self {
        self.desktop = desktop;
        self
    }

    /// Apply desktop fix-up and anchor relative paths at the workspace.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let fixed = PathBuf::from(fix_path(raw, &self.desktop));
        if fixed.is_absolute() {
            fixed
        } else {
            self.workspace.join(fixed)
        }
    }
}

/// Replace the common desktop spellings with the real desktop directory.
pub fn fix_path(raw: &str, desktop: &Path) -> String {
    let desktop = desktop.to_string_lossy();
    raw.replace("~/Desktop", &desktop)
        .replace("~/desktop", &desktop)
        .replace("/desktop", &desktop)
}

fn default_desktop() -> PathBuf {
    dirs::desktop_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Desktop")))
        .unwrap_or_else(|| PathBuf::from("Desktop"))
}
