//! Routing: a published source that forwards whichever source it points at.

use std::{fmt, sync::Arc};

use crate::{
    dispatch::run_blocking,
    finder::Source,
    handle::{Handle, HandleKind},
    sys::NativeRouter,
    Error, Ndi, Result,
};

/// Configuration for a [`Routing`] endpoint.
#[derive(Debug, Clone)]
pub struct RoutingOptions {
    pub name: String,
    pub groups: Option<String>,
}

impl RoutingOptions {
    pub fn builder<S: Into<String>>(name: S) -> RoutingOptionsBuilder {
        RoutingOptionsBuilder {
            name: name.into(),
            groups: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArguments(
                "Routing name cannot be empty or contain only whitespace".into(),
            ));
        }
        if self.name.contains('\0') || self.groups.as_deref().is_some_and(|g| g.contains('\0')) {
            return Err(Error::InvalidArguments(
                "Routing options cannot contain NUL bytes".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`RoutingOptions`].
#[derive(Debug, Clone)]
pub struct RoutingOptionsBuilder {
    name: String,
    groups: Option<String>,
}

impl RoutingOptionsBuilder {
    #[must_use]
    pub fn groups<S: Into<String>>(mut self, groups: S) -> Self {
        self.groups = Some(groups.into());
        self
    }

    pub fn build(self) -> Result<RoutingOptions> {
        let options = RoutingOptions {
            name: self.name,
            groups: self.groups,
        };
        options.validate()?;
        Ok(options)
    }
}

/// A virtual source whose receivers are transparently switched between real sources.
#[derive(Clone)]
pub struct Routing {
    handle: Arc<Handle<Box<dyn NativeRouter>>>,
}

impl Routing {
    pub async fn open(ndi: &Ndi, options: RoutingOptions) -> Result<Self> {
        options.validate()?;

        let ndi = ndi.clone();
        run_blocking(move || {
            let native = ndi
                .backend()
                .create_router(&options)
                .ok_or_else(|| Error::CreateFailed("Failed to create NDI router.".into()))?;
            Ok(Routing {
                handle: Arc::new(Handle::new(&ndi, HandleKind::Routing, native)),
            })
        })
        .await
    }

    /// Point the route at `source`.
    pub fn change(&self, source: &Source) -> Result<bool> {
        let strings = [Some(&source.name), source.url_address.as_ref()];
        if strings.into_iter().flatten().any(|s| s.contains('\0')) {
            return Err(Error::InvalidArguments(
                "Source cannot contain NUL bytes".into(),
            ));
        }
        self.handle.with(|native| native.change(source))
    }

    /// Disconnect the route; receivers see no source until the next `change`.
    pub fn clear(&self) -> Result<bool> {
        self.handle.with(|native| native.clear())
    }

    pub fn connections(&self) -> Result<i32> {
        self.handle.with(|native| native.connections(0))
    }

    /// Fully-qualified name receivers use to connect to this route.
    pub fn source_name(&self) -> Result<String> {
        self.handle.with(|native| native.source().name)
    }

    pub fn destroy(&self) -> bool {
        self.handle.destroy()
    }

    pub fn is_destroyed(&self) -> bool {
        !self.handle.is_live()
    }
}

impl fmt::Debug for Routing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routing")
            .field("live", &self.handle.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_blank_names() {
        assert!(RoutingOptions::builder("").build().is_err());
        let options = RoutingOptions::builder("Switch").groups("studio").build().unwrap();
        assert_eq!(options.groups.as_deref(), Some("studio"));
    }

    #[tokio::test]
    async fn open_revalidates_literal_options() {
        let ndi = Ndi::loopback().unwrap();
        for name in ["  ", "Sw\0itch"] {
            let options = RoutingOptions {
                name: name.into(),
                groups: None,
            };
            let err = ndi.open_routing(options).await.unwrap_err();
            assert!(matches!(err, Error::InvalidArguments(_)));
        }
        assert_eq!(ndi.live_handles(HandleKind::Routing), 0);
    }

    #[tokio::test]
    async fn source_name_is_host_qualified() {
        let ndi = Ndi::loopback().unwrap();
        let routing = ndi
            .open_routing(RoutingOptions::builder("Switch").build().unwrap())
            .await
            .unwrap();
        assert_eq!(routing.source_name().unwrap(), "LOOPBACK (Switch)");
        assert_eq!(routing.connections().unwrap(), 0);
        assert!(routing.clear().unwrap());
        assert!(routing.destroy());
        assert!(matches!(
            routing.source_name(),
            Err(Error::Destroyed(HandleKind::Routing))
        ));
    }
}
