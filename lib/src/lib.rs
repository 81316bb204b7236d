//! A small, fast static site generator library.
//!
//! # Overview
//!
//! Wren turns a directory of content files into a site:
//!
//! ```text
//!   project root
//!        │
//!   classify ──▶ statics ─────────────────────────────▶ copied verbatim
//!        │
//!        ├────▶ layouts ──────────────┐
//!        │                            ▼
//!        └────▶ content ──▶ pages ──▶ render ──▶ layout ──▶ parent layout ──▶ html
//!                             ▲
//!                    scope generators (optional, per page)
//! ```
//!
//! In words:
//!
//!   * Every file under the root is [classified](classify) as static,
//!     content (`html`, `md`, `txt`), or a layout (under `_layouts/`).
//!     Hidden files, dependency directories, lockfiles and the like are
//!     excluded.
//!
//!   * Each content file is parsed into a [`Page`](page::Page): its
//!     [front matter](frontmatter) becomes metadata, its body becomes
//!     content, and its path determines its URL and _kind_. Files in `_posts/`
//!     are of kind `posts`, served at `/posts/...`.
//!
//!   * Pages are collected into a [`Registry`](registry::Registry) that
//!     resolves URLs and groups pages by kind, newest first.
//!
//!   * A page is [rendered](render) by running its optional
//!     [scope generator](scope), rendering its own content as a template,
//!     then wrapping the result in its layout, that layout's layout, and so
//!     on.
//!
//! [`build`](build::build) writes the whole site to an output directory.
//! [`dev`] serves it, reparsing on every change and telling browsers to
//! reload.

#[macro_use]
pub mod error;
pub mod util;
pub mod fstree;
pub mod config;
pub mod metadata;
pub mod frontmatter;
pub mod markdown;
pub mod page;
pub mod registry;
pub mod classify;
pub mod scope;
pub mod templating;
pub mod render;
pub mod site;
pub mod build;
pub mod dev;

pub use config::Config;
pub use page::Page;
pub use site::Site;
pub use render::Renderer;

pub use rayon;
