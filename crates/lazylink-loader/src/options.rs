//! Collection initialization options.

/// Option name used in the unsupported-combination error message.
pub(crate) const REF_OPTION: &str = ":ref";

/// Loading-mode options for collection initialization.
///
/// `dataloader` selects batched loading through a
/// [`BatchWindow`](crate::BatchWindow). `ref_only` populates identifier
/// stand-ins instead of full entities. The two cannot be combined: batched
/// reference-only loading is rejected with an unsupported-option error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Consolidate this load with others in the same batch window.
    pub dataloader: bool,
    /// Populate identifier stand-ins only, not full entity data.
    pub ref_only: bool,
}

impl InitOptions {
    /// Default options: immediate load, full entities.
    pub const fn new() -> Self {
        Self {
            dataloader: false,
            ref_only: false,
        }
    }

    /// Enable batched loading.
    pub const fn dataloader(mut self) -> Self {
        self.dataloader = true;
        self
    }

    /// Enable reference-only loading.
    pub const fn ref_only(mut self) -> Self {
        self.ref_only = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_compose() {
        let opts = InitOptions::new().dataloader();
        assert!(opts.dataloader);
        assert!(!opts.ref_only);

        let both = InitOptions::new().dataloader().ref_only();
        assert!(both.dataloader && both.ref_only);

        assert_eq!(InitOptions::default(), InitOptions::new());
    }
}
