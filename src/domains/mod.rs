//! Business operations shared by the HTTP handlers and the CLI.
//!
//! Everything a domain needs lives in one cloneable [`Dependencies`]
//! record. Each domain is a thin borrowed view over it, so handlers can
//! write `deps.bookmarks().create(..)` without any global state.

mod accounts;
mod auth;
mod bookmarks;
mod storage;
mod tags;

pub use accounts::{AccountsDomain, SelfUpdate};
pub use auth::{AuthDomain, BOOTSTRAP_ACCOUNT_ID, LoginRequest, LoginResponse};
pub use bookmarks::{BookmarkList, BookmarkPatch, BookmarksDomain, ListBookmarks, ReadableContent};
pub use storage::{ArtifactKind, StorageDomain};
pub use tags::TagsDomain;

use std::sync::Arc;

use crate::auth::{SsoProxy, TokenIssuer};
use crate::config::Config;
use crate::error::Result;
use crate::ingest::{
    Archiver, EbookGenerator, EpubGenerator, Extractor, FETCH_TIMEOUT, Fetcher, Pipeline,
    ReadabilityExtractor, WarcArchiver,
};
use crate::store::Store;

#[derive(Clone)]
pub struct Dependencies {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub tokens: Arc<TokenIssuer>,
    /// Present when proxy authentication is enabled.
    pub sso: Option<Arc<SsoProxy>>,
    pub fetcher: Fetcher,
    pub extractor: Arc<dyn Extractor>,
    pub archiver: Arc<dyn Archiver>,
    pub ebooks: Arc<dyn EbookGenerator>,
}

impl Dependencies {
    /// Wires the default collaborators around an opened store.
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        let tokens = Arc::new(TokenIssuer::new(&config.http.secret_key));
        let sso = config.http.sso_proxy_auth.then(|| {
            Arc::new(SsoProxy::new(
                config.http.sso_proxy_auth_header_name.clone(),
                config.http.sso_proxy_auth_trusted.clone(),
            ))
        });

        Ok(Self {
            config: Arc::new(config),
            store,
            tokens,
            sso,
            fetcher: Fetcher::new(FETCH_TIMEOUT)?,
            extractor: Arc::new(ReadabilityExtractor),
            archiver: Arc::new(WarcArchiver),
            ebooks: Arc::new(EpubGenerator),
        })
    }

    #[must_use]
    pub fn bookmarks(&self) -> BookmarksDomain<'_> {
        BookmarksDomain::new(self)
    }

    #[must_use]
    pub fn tags(&self) -> TagsDomain<'_> {
        TagsDomain::new(self)
    }

    #[must_use]
    pub fn accounts(&self) -> AccountsDomain<'_> {
        AccountsDomain::new(self)
    }

    #[must_use]
    pub fn auth(&self) -> AuthDomain<'_> {
        AuthDomain::new(self)
    }

    #[must_use]
    pub fn storage(&self) -> StorageDomain<'_> {
        StorageDomain::new(self)
    }

    #[must_use]
    pub fn ingest(&self) -> Pipeline<'_> {
        Pipeline::new(self)
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("data_dir", &self.config.data_dir)
            .field("dialect", &self.store.dialect())
            .field("sso", &self.sso.is_some())
            .finish_non_exhaustive()
    }
}
