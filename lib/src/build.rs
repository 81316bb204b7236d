use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::config::Config;
use crate::error::{Chainable, Error, ErrorKind, Result};
use crate::page::Page;
use crate::render::Renderer;
use crate::scope::Resolvers;
use crate::site::Site;

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub output: PathBuf,
    pub pages: usize,
    pub statics: usize,
    pub elapsed: Duration,
}

/// Builds the project with the default scope resolvers.
pub fn build(config: &Config) -> Result<BuildReport> {
    build_with(config, Resolvers::default())
}

/// Parses and validates the project, then writes every static file and
/// rendered page to the output directory, which is recreated from scratch.
/// Any failure aborts the build.
pub fn build_with(config: &Config, resolvers: Resolvers) -> Result<BuildReport> {
    let start = Instant::now();
    let site = Site::parse(config, resolvers)?;
    site.validate(config)?;

    let output = config.output_path();
    if config.root.starts_with(&output) {
        return Err(error! {
            "output directory must not contain the project root",
            "output" => output.display(),
        }.with_kind(ErrorKind::Configuration));
    }

    if output.exists() {
        fs::remove_dir_all(&output)
            .chain_with(|| error!("failed to clear output directory", "output" => output.display()))?;
    }

    fs::create_dir_all(&output)
        .chain_with(|| error!("failed to create output directory", "output" => output.display()))?;

    site.statics().par_iter().try_for_each(|relative| {
        let destination = output.join(relative);
        ensure_parent(&destination)?;
        fs::copy(site.root().join(relative), &destination)
            .chain_with(|| error!("failed to copy static file", "file" => relative))?;

        Ok::<_, Error>(())
    })?;

    let renderer = Renderer::new(config);
    let write_page = |page: &Page| -> Result<()> {
        let destination = output.join(output_path_for(&page.url));
        let rendered = renderer.render(&site, page)?;
        ensure_parent(&destination)?;
        fs::write(&destination, rendered.html)
            .chain_with(|| error!("failed to write page", "page" => &page.relative_path))
    };

    let failures: Vec<Error> = site.pages().par_iter()
        .filter_map(|page| write_page(page).err())
        .collect();

    if let Some(error) = failures.into_iter().reduce(|a, b| a.chain(b)) {
        return Err(error.chain(error!("build failed")));
    }

    let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
    fs::write(output.join(format!("build-{stamp}")), "build complete!\n")?;

    let report = BuildReport {
        output,
        pages: site.pages().len(),
        statics: site.statics().len(),
        elapsed: start.elapsed(),
    };

    log::info!(target: "wren::build", "wrote {} pages and {} static files to {} in {}ms",
        report.pages, report.statics, report.output.display(), report.elapsed.as_millis());

    Ok(report)
}

/// The output file for `url`, relative to the output directory. URLs whose
/// last segment has no extension get `index.html` appended.
pub fn output_path_for(url: &str) -> PathBuf {
    let relative = url.trim_start_matches('/');
    let last = relative.rsplit('/').next().unwrap_or(relative);
    match Path::new(last).extension() {
        Some(_) => PathBuf::from(relative),
        None => Path::new(relative).join("index.html"),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .chain_with(|| error!("failed to create directory", "directory" => parent.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_to_output_path() {
        assert_eq!(output_path_for("/index.html"), Path::new("index.html"));
        assert_eq!(output_path_for("/posts/a.html"), Path::new("posts/a.html"));
        assert_eq!(output_path_for("/docs/"), Path::new("docs/index.html"));
        assert_eq!(output_path_for("/docs"), Path::new("docs/index.html"));
        assert_eq!(output_path_for("/"), Path::new("index.html"));
    }

    #[test]
    fn output_must_not_swallow_the_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "x").unwrap();
        std::fs::create_dir(dir.path().join("_layouts")).unwrap();
        std::fs::write(dir.path().join("_layouts/layout.html"), "{{ content }}").unwrap();

        let mut config = Config::new(dir.path());
        config.settings.output = ".".into();
        let error = build_with(&config, Resolvers::empty()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(dir.path().join("index.html").exists());
    }
}
