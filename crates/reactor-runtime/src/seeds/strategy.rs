use std::sync::Arc;

use reactor_core::config::{ResolverKind, SeedsConfig};
use reactor_core::script::{ScriptSource, SeedStrategy};

/// Inspects a discovered seed and either picks its strategy or declines.
pub trait StrategyResolver: Send + Sync {
    fn resolve(&self, source: &ScriptSource) -> Option<SeedStrategy>;
}

impl<F> StrategyResolver for F
where
    F: Fn(&ScriptSource) -> Option<SeedStrategy> + Send + Sync,
{
    fn resolve(&self, source: &ScriptSource) -> Option<SeedStrategy> {
        self(source)
    }
}

/// Strategy from the folder a seed was found in, e.g. `reference/run-always/`.
///
/// The innermost folder that names a strategy wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct FolderConvention;

impl StrategyResolver for FolderConvention {
    fn resolve(&self, source: &ScriptSource) -> Option<SeedStrategy> {
        source
            .folder
            .as_deref()?
            .rsplit('/')
            .find_map(SeedStrategy::from_convention)
    }
}

/// Strategy from the last dot-separated segment of a seed name, e.g.
/// `001_countries.always`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamingConvention;

impl StrategyResolver for NamingConvention {
    fn resolve(&self, source: &ScriptSource) -> Option<SeedStrategy> {
        let (_, suffix) = source.name.rsplit_once('.')?;
        SeedStrategy::from_convention(suffix)
    }
}

/// Ordered resolvers plus a fallback. The first resolver that answers wins.
#[derive(Clone)]
pub struct StrategyChain {
    resolvers: Vec<Arc<dyn StrategyResolver>>,
    fallback: SeedStrategy,
}

impl StrategyChain {
    pub fn new(fallback: SeedStrategy) -> Self {
        Self {
            resolvers: Vec::new(),
            fallback,
        }
    }

    /// Chain described by the `[seeds]` configuration section.
    pub fn from_config(config: &SeedsConfig) -> Self {
        config
            .resolvers
            .iter()
            .fold(Self::new(config.fallback_strategy), |chain, kind| match kind {
                ResolverKind::Folder => chain.with(FolderConvention),
                ResolverKind::Naming => chain.with(NamingConvention),
            })
    }

    /// Append a resolver, evaluated after those already added.
    pub fn with(mut self, resolver: impl StrategyResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    pub fn fallback(&self) -> SeedStrategy {
        self.fallback
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn resolve(&self, source: &ScriptSource) -> SeedStrategy {
        self.resolvers
            .iter()
            .find_map(|r| r.resolve(source))
            .unwrap_or(self.fallback)
    }
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::from_config(&SeedsConfig::default())
    }
}

impl std::fmt::Debug for StrategyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyChain")
            .field("resolvers", &self.resolvers.len())
            .field("fallback", &self.fallback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(name: &str, folder: Option<&str>) -> ScriptSource {
        let source = ScriptSource::text(name, "SELECT 1");
        match folder {
            Some(folder) => source.with_folder(folder),
            None => source,
        }
    }

    #[test]
    fn test_folder_convention() {
        assert_eq!(
            FolderConvention.resolve(&seed("001_countries", Some("reference/run-always"))),
            Some(SeedStrategy::RunAlways)
        );
        assert_eq!(
            FolderConvention.resolve(&seed("001_countries", Some("RunIfChanged/lookup"))),
            Some(SeedStrategy::RunIfChanged)
        );
        assert_eq!(FolderConvention.resolve(&seed("001_countries", Some("reference"))), None);
        assert_eq!(FolderConvention.resolve(&seed("001_countries", None)), None);
    }

    #[test]
    fn test_naming_convention() {
        assert_eq!(
            NamingConvention.resolve(&seed("001_countries.always", None)),
            Some(SeedStrategy::RunAlways)
        );
        assert_eq!(
            NamingConvention.resolve(&seed("001_countries.run-once", None)),
            Some(SeedStrategy::RunOnce)
        );
        assert_eq!(NamingConvention.resolve(&seed("001_countries", None)), None);
    }

    #[test]
    fn test_first_match_wins() {
        let source = seed("001_countries.once", Some("run-always"));

        let folder_first = StrategyChain::new(SeedStrategy::RunIfChanged)
            .with(FolderConvention)
            .with(NamingConvention);
        assert_eq!(folder_first.resolve(&source), SeedStrategy::RunAlways);

        let naming_first = StrategyChain::new(SeedStrategy::RunIfChanged)
            .with(NamingConvention)
            .with(FolderConvention);
        assert_eq!(naming_first.resolve(&source), SeedStrategy::RunOnce);
    }

    #[test]
    fn test_fallback_when_nothing_matches() {
        let chain = StrategyChain::new(SeedStrategy::RunIfChanged).with(FolderConvention);
        assert_eq!(
            chain.resolve(&seed("001_countries", Some("reference"))),
            SeedStrategy::RunIfChanged
        );
    }

    #[test]
    fn test_closure_resolver() {
        let chain = StrategyChain::new(SeedStrategy::RunOnce).with(|source: &ScriptSource| {
            source
                .name
                .starts_with("audit_")
                .then_some(SeedStrategy::RunAlways)
        });
        assert_eq!(chain.resolve(&seed("audit_log", None)), SeedStrategy::RunAlways);
        assert_eq!(chain.resolve(&seed("users", None)), SeedStrategy::RunOnce);
    }

    #[test]
    fn test_from_config_order() {
        let config = SeedsConfig {
            resolvers: vec![ResolverKind::Naming],
            fallback_strategy: SeedStrategy::RunAlways,
            ..Default::default()
        };
        let chain = StrategyChain::from_config(&config);
        assert_eq!(chain.len(), 1);
        assert_eq!(
            chain.resolve(&seed("001_a", Some("run-once"))),
            SeedStrategy::RunAlways
        );
    }
}
