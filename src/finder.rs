//! Source discovery.

use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use crate::{
    capture::Deadline,
    dispatch::run_blocking,
    handle::{Handle, HandleKind},
    sys::NativeFinder,
    Error, Ndi, Result,
};

/// Configuration for source discovery.
///
/// # Examples
///
/// ```
/// use ndi_bridge::FinderOptions;
///
/// // Find sources in specific groups
/// let options = FinderOptions::builder()
///     .groups("Public,Studio")
///     .build();
/// assert!(options.show_local_sources);
///
/// // Find sources on specific network segments
/// let options = FinderOptions::builder()
///     .extra_ips("192.168.1.0/24,10.0.0.0/24")
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct FinderOptions {
    /// Whether to include sources on this machine.
    pub show_local_sources: bool,
    /// Comma-separated list of groups to search (e.g., "Public,Private").
    pub groups: Option<String>,
    /// Additional IP addresses or ranges to search.
    pub extra_ips: Option<String>,
}

impl FinderOptions {
    pub fn builder() -> FinderOptionsBuilder {
        FinderOptionsBuilder::new()
    }
}

/// Builder for [`FinderOptions`].
#[derive(Debug, Clone, Default)]
pub struct FinderOptionsBuilder {
    show_local_sources: Option<bool>,
    groups: Option<String>,
    extra_ips: Option<String>,
}

impl FinderOptionsBuilder {
    /// Creates a new builder with default settings.
    ///
    /// Default settings:
    /// - `show_local_sources`: `true`
    /// - `groups`: `None` (the default group)
    /// - `extra_ips`: `None`
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn show_local_sources(mut self, show: bool) -> Self {
        self.show_local_sources = Some(show);
        self
    }

    #[must_use]
    pub fn groups<S: Into<String>>(mut self, groups: S) -> Self {
        self.groups = Some(groups.into());
        self
    }

    #[must_use]
    pub fn extra_ips<S: Into<String>>(mut self, ips: S) -> Self {
        self.extra_ips = Some(ips.into());
        self
    }

    #[must_use]
    pub fn build(self) -> FinderOptions {
        FinderOptions {
            show_local_sources: self.show_local_sources.unwrap_or(true),
            groups: self.groups,
            extra_ips: self.extra_ips,
        }
    }
}

/// A discoverable network endpoint.
///
/// The name usually has the form `"MACHINE (Source Name)"`.
///
/// ```
/// use ndi_bridge::Source;
///
/// let source = Source::with_url("LAPTOP (Camera 1)", "192.168.1.100:5960");
/// assert_eq!(source.to_string(), "LAPTOP (Camera 1)@192.168.1.100:5960");
/// assert_eq!(source.host(), Some("192.168.1.100"));
/// assert_eq!(source.port(), Some(5960));
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub name: String,
    pub url_address: Option<String>,
}

impl Source {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            url_address: None,
        }
    }

    pub fn with_url<S: Into<String>, U: Into<String>>(name: S, url: U) -> Self {
        Self {
            name: name.into(),
            url_address: Some(url.into()),
        }
    }

    /// The part of the name in parentheses, e.g. `"Camera 1"` for
    /// `"LAPTOP (Camera 1)"`.
    pub fn stream_name(&self) -> &str {
        match (self.name.find('('), self.name.rfind(')')) {
            (Some(open), Some(close)) if open < close => &self.name[open + 1..close],
            _ => &self.name,
        }
    }

    /// Check the name and address for `host`.
    pub fn matches_host(&self, host: &str) -> bool {
        self.name.contains(host)
            || self
                .url_address
                .as_deref()
                .is_some_and(|url| url.contains(host))
    }

    /// Host part of the address, without scheme, port or path.
    pub fn host(&self) -> Option<&str> {
        let url = self.url_address.as_deref()?;
        let without_scheme = url.find("://").map_or(url, |idx| &url[idx + 3..]);
        let host = without_scheme
            .split(['/', ':'])
            .next()
            .unwrap_or(without_scheme);
        (!host.is_empty()).then_some(host)
    }

    pub fn port(&self) -> Option<u16> {
        let url = self.url_address.as_deref()?;
        let without_scheme = url.find("://").map_or(url, |idx| &url[idx + 3..]);
        let authority = without_scheme.split('/').next()?;
        let (_, port) = authority.rsplit_once(':')?;
        port.parse().ok()
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.url_address {
            Some(url) => write!(f, "{}@{}", self.name, url),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Discovers sources on the network.
///
/// A finder keeps a background discovery session open until destroyed. It is meant
/// for a single owner; concurrent `wait` calls on one finder are not coordinated.
///
/// ```no_run
/// # use ndi_bridge::{Ndi, FinderOptions};
/// # async fn run() -> Result<(), ndi_bridge::Error> {
/// let ndi = Ndi::loopback()?;
/// let finder = ndi.open_finder(FinderOptions::builder().build()).await?;
/// if finder.wait(5000).await? {
///     for source in finder.sources()? {
///         println!("Found: {source}");
///     }
/// }
/// finder.destroy();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Finder {
    handle: Arc<Handle<Box<dyn NativeFinder>>>,
}

impl Finder {
    /// Open a discovery session.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArguments`] for strings with interior NUL bytes,
    /// [`Error::CreateFailed`] if the backend refuses.
    pub async fn open(ndi: &Ndi, options: FinderOptions) -> Result<Self> {
        for value in [&options.groups, &options.extra_ips].into_iter().flatten() {
            if value.contains('\0') {
                return Err(Error::InvalidArguments(
                    "Finder options cannot contain NUL bytes".into(),
                ));
            }
        }

        let ndi = ndi.clone();
        run_blocking(move || {
            let native = ndi
                .backend()
                .create_finder(&options)
                .ok_or_else(|| Error::CreateFailed("Failed to create NDI finder.".into()))?;
            Ok(Finder {
                handle: Arc::new(Handle::new(&ndi, HandleKind::Finder, native)),
            })
        })
        .await
    }

    /// Block (on a worker) up to `timeout_ms` for the source list to change.
    ///
    /// Returns `true` if the list changed since the previous call. A timeout of zero
    /// only checks. Long waits are split into slices, so a concurrent
    /// [`destroy`](Self::destroy) ends the wait with [`Error::Destroyed`] within
    /// one slice.
    pub async fn wait(&self, timeout_ms: u32) -> Result<bool> {
        let handle = Arc::clone(&self.handle);
        run_blocking(move || {
            if timeout_ms == 0 {
                return handle.with(|native| native.wait_for_sources(0));
            }
            let deadline = Deadline::new(timeout_ms);
            while let Some(slice) = deadline.next_slice() {
                if handle.with(|native| native.wait_for_sources(slice))? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .await
    }

    /// Latest snapshot of discovered sources.
    pub fn sources(&self) -> Result<Vec<Source>> {
        self.handle.with(|native| native.current_sources())
    }

    /// Release the discovery session. `false` if it was already released.
    pub fn destroy(&self) -> bool {
        self.handle.destroy()
    }

    pub fn is_destroyed(&self) -> bool {
        !self.handle.is_live()
    }
}

impl fmt::Debug for Finder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finder")
            .field("live", &self.handle.is_live())
            .finish()
    }
}
