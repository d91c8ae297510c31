use std::{fs, path::Path};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::core::tooling::latin1;

/// Centre of the first node in a `uiautomator dump` whose attributes contain
/// `label` ahead of its `bounds="[x1,y1][x2,y2]"`.
#[must_use]
pub fn ui_coordinates(xml: &str, label: &str) -> Option<(f64, f64)> {
    let pattern = format!(
        r#"{}.*?bounds="\[(\d+),(\d+)\]\[(\d+),(\d+)\]".+"#,
        regex::escape(label)
    );
    let regex = Regex::new(&pattern).ok()?;
    let captures = regex.captures(xml)?;
    let corner = |index: usize| -> Option<f64> { captures.get(index)?.as_str().parse().ok() };
    let (x1, y1, x2, y2) = (corner(1)?, corner(2)?, corner(3)?, corner(4)?);
    debug!(x1, y1, x2, y2, "found bounds");
    let centre = (f64::midpoint(x1, x2), f64::midpoint(y1, y2));
    debug!(x = centre.0, y = centre.1, "click coordinates");
    Some(centre)
}

/// [`ui_coordinates`] over a dump file read as ISO-8859-1.
///
/// # Errors
/// Returns an error when the file cannot be read.
pub fn ui_coordinates_in_file(path: &Path, label: &str) -> Result<Option<(f64, f64)>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(ui_coordinates(&latin1::decode(&bytes), label))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = concat!(
        r#"<node index="0" text="Cancel" resource-id="android:id/button2" bounds="[100,1800][400,1900]" />"#,
        "\n",
        r#"<node index="1" text="Install" resource-id="android:id/button1" bounds="[600,1800][981,1901]" />"#,
        "\n",
    );

    #[test]
    fn finds_centre_of_labelled_node() {
        assert_eq!(ui_coordinates(DUMP, "Install"), Some((790.5, 1850.5)));
        assert_eq!(ui_coordinates(DUMP, "Cancel"), Some((250.0, 1850.0)));
    }

    #[test]
    fn missing_label_is_none() {
        assert_eq!(ui_coordinates(DUMP, "Reboot"), None);
    }

    #[test]
    fn label_is_matched_literally() {
        assert_eq!(ui_coordinates(DUMP, "Inst.ll"), None);
    }

    #[test]
    fn reads_dump_file() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("view.xml");
        fs::write(&path, DUMP)?;
        assert_eq!(
            ui_coordinates_in_file(&path, "Cancel")?,
            Some((250.0, 1850.0))
        );
        Ok(())
    }
}
