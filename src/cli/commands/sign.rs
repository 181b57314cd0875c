//! Sign command implementation
//!
//! Signs documents locally and writes the signed XML next to the input, or
//! into `--output-dir`. Nothing is sent.

use super::{load_or_report, open_identity, report};
use crate::core::signing::CanonicalSigner;
use crate::domain::EkuatiaError;
use clap::Args;
use std::path::{Path, PathBuf};

/// Arguments for the sign command
#[derive(Args, Debug)]
pub struct SignArgs {
    /// Documents to sign (`DE` or `rDE`)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory for the signed files (defaults to each input's directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

impl SignArgs {
    /// Execute the sign command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        let identity = match open_identity(&config) {
            Ok(i) => i,
            Err(e) => return Ok(report("Failed to load certificate", &e)),
        };
        let signer = CanonicalSigner::new(identity, config.sifen.version.clone());

        for input in &self.inputs {
            let bytes = std::fs::read(input)?;
            let signed = match signer.sign(&bytes) {
                Ok(s) => s,
                Err(e) => return Ok(report(&format!("Failed to sign {}", input.display()), &e)),
            };

            let output = self.output_path(input);
            std::fs::write(&output, signed.as_bytes())
                .map_err(|e| EkuatiaError::Io(format!("{}: {e}", output.display())))?;

            let note = if signed.is_passthrough() {
                " (already signed)"
            } else {
                ""
            };
            println!("✅ {} -> {}{note}", signed.cdc(), output.display());
        }

        Ok(0)
    }

    fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let name = format!("{stem}.signed.xml");
        match &self.output_dir {
            Some(dir) => dir.join(name),
            None => input.with_file_name(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path() {
        let args = SignArgs {
            inputs: vec![],
            output_dir: None,
        };
        assert_eq!(
            args.output_path(Path::new("/tmp/in/factura.xml")),
            PathBuf::from("/tmp/in/factura.signed.xml")
        );

        let args = SignArgs {
            inputs: vec![],
            output_dir: Some(PathBuf::from("/tmp/out")),
        };
        assert_eq!(
            args.output_path(Path::new("factura.xml")),
            PathBuf::from("/tmp/out/factura.signed.xml")
        );
    }
}
