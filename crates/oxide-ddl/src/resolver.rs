//! Rename resolution.
//!
//! A diff alone cannot tell a renamed table from a dropped table plus a new
//! one. The planner hands every `(created, deleted)` batch to a [`Resolver`]
//! which decides which pairs are renames. Three strategies are provided:
//!
//! - [`PredeterminedResolver`]: a fixed rename map (or none at all), used for
//!   dry runs, tests and persisted rename decisions.
//! - [`HeuristicResolver`]: name similarity, greedy best-first pairing.
//! - [`PromptResolver`]: asks a [`RenamePrompt`] implementation, typically an
//!   interactive terminal prompt.
//!
//! Resolvers compose with [`ChainResolver`].

use std::collections::HashSet;

use tracing::debug;

use crate::error::{DdlError, Result};

/// Default similarity threshold for [`HeuristicResolver`].
pub const RENAME_SIMILARITY_THRESHOLD: f64 = 0.4;

/// An entity that can take part in rename resolution.
pub trait Renameable: Clone {
    /// Entity name.
    fn name(&self) -> &str;

    /// Enclosing scope, e.g. the table of a column.
    fn scope(&self) -> Option<&str> {
        None
    }

    /// `scope.name`, or `name` for unscoped entities.
    fn label(&self) -> String {
        match self.scope() {
            Some(scope) => format!("{scope}.{}", self.name()),
            None => self.name().to_string(),
        }
    }
}

/// Entities that only exist on one side of a diff.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverInput<T> {
    /// Entities present in the target only.
    pub created: Vec<T>,
    /// Entities present in the source only.
    pub deleted: Vec<T>,
}

/// A resolved rename.
#[derive(Debug, Clone, PartialEq)]
pub struct Renamed<T> {
    /// Entity as it exists in the source.
    pub from: T,
    /// Entity as it exists in the target.
    pub to: T,
}

impl<T: Renameable> Renamed<T> {
    /// `from->to` form, as persisted in snapshots.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}->{}", self.from.label(), self.to.label())
    }
}

/// Classification of a [`ResolverInput`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverOutput<T> {
    /// Entities to create.
    pub created: Vec<T>,
    /// Entities to drop.
    pub deleted: Vec<T>,
    /// Entities to rename.
    pub renamed: Vec<Renamed<T>>,
}

impl<T> ResolverOutput<T> {
    /// Classifies every entity as a plain create or drop.
    #[must_use]
    pub fn unchanged(input: ResolverInput<T>) -> Self {
        Self {
            created: input.created,
            deleted: input.deleted,
            renamed: Vec::new(),
        }
    }
}

/// Decides which created/deleted pairs are renames.
#[allow(async_fn_in_trait)]
pub trait Resolver<T> {
    /// Classifies the input.
    async fn resolve(&self, input: ResolverInput<T>) -> Result<ResolverOutput<T>>;
}

/// Runs a resolver and checks that its output is a partition of its input:
/// every rename pairs a deleted entity with a created one and no entity is
/// used twice or invented.
pub async fn resolve_checked<T, R>(
    resolver: &R,
    input: ResolverInput<T>,
) -> Result<ResolverOutput<T>>
where
    T: Renameable,
    R: Resolver<T> + ?Sized,
{
    if input.created.is_empty() && input.deleted.is_empty() {
        return Ok(ResolverOutput::unchanged(input));
    }

    let mut created: Vec<String> = input.created.iter().map(Renameable::label).collect();
    let mut deleted: Vec<String> = input.deleted.iter().map(Renameable::label).collect();
    let output = resolver.resolve(input).await?;

    let mut out_created: Vec<String> = output
        .created
        .iter()
        .chain(output.renamed.iter().map(|r| &r.to))
        .map(Renameable::label)
        .collect();
    let mut out_deleted: Vec<String> = output
        .deleted
        .iter()
        .chain(output.renamed.iter().map(|r| &r.from))
        .map(Renameable::label)
        .collect();

    created.sort();
    deleted.sort();
    out_created.sort();
    out_deleted.sort();
    if created != out_created {
        return Err(DdlError::InvalidResolution(format!(
            "created entities [{}] do not match input [{}]",
            out_created.join(", "),
            created.join(", ")
        )));
    }
    if deleted != out_deleted {
        return Err(DdlError::InvalidResolution(format!(
            "deleted entities [{}] do not match input [{}]",
            out_deleted.join(", "),
            deleted.join(", ")
        )));
    }
    Ok(output)
}

// ============================================================================
// Predetermined
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct QualifiedName {
    scope: Option<String>,
    name: String,
}

impl QualifiedName {
    fn parse(value: &str) -> Self {
        match value.split_once('.') {
            Some((scope, name)) => Self {
                scope: Some(scope.trim().to_string()),
                name: name.trim().to_string(),
            },
            None => Self {
                scope: None,
                name: value.trim().to_string(),
            },
        }
    }

    fn matches<T: Renameable>(&self, entity: &T) -> bool {
        self.name == entity.name() && self.scope.as_deref() == entity.scope()
    }
}

/// Resolves renames from a fixed map.
///
/// Without rules every entity is a plain create or drop. Rules are written
/// `from->to` for tables and `table.from->table.to` for columns; a rule
/// applies only when both sides are part of the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredeterminedResolver {
    rules: Vec<(QualifiedName, QualifiedName)>,
}

impl PredeterminedResolver {
    /// A resolver that never renames.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds a rename rule.
    #[must_use]
    pub fn rename(mut self, from: &str, to: &str) -> Self {
        self.rules
            .push((QualifiedName::parse(from), QualifiedName::parse(to)));
        self
    }

    /// Parses `from->to` rules, e.g. the `renames` of a previous snapshot.
    pub fn parse<S: AsRef<str>>(rules: &[S]) -> Result<Self> {
        let mut resolver = Self::none();
        for rule in rules {
            let rule = rule.as_ref();
            let (from, to) = rule
                .split_once("->")
                .filter(|(from, to)| !from.trim().is_empty() && !to.trim().is_empty())
                .ok_or_else(|| DdlError::InvalidRename(rule.to_string()))?;
            resolver = resolver.rename(from, to);
        }
        Ok(resolver)
    }

    /// Returns true if no rule is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<T: Renameable> Resolver<T> for PredeterminedResolver {
    async fn resolve(&self, input: ResolverInput<T>) -> Result<ResolverOutput<T>> {
        let ResolverInput {
            mut created,
            mut deleted,
        } = input;
        let mut renamed = Vec::new();

        for (from, to) in &self.rules {
            let Some(d) = deleted.iter().position(|it| from.matches(it)) else {
                continue;
            };
            let Some(c) = created.iter().position(|it| to.matches(it)) else {
                continue;
            };
            renamed.push(Renamed {
                from: deleted.remove(d),
                to: created.remove(c),
            });
        }

        Ok(ResolverOutput {
            created,
            deleted,
            renamed,
        })
    }
}

// ============================================================================
// Heuristic
// ============================================================================

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let n = b.len();
    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// Normalized similarity in `[0.0, 1.0]`, 1.0 meaning identical.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

type Compatible<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Pairs deleted and created entities by name similarity.
///
/// Candidate pairs must share a scope, pass the compatibility check and
/// reach the threshold; the most similar pairs are taken first.
pub struct HeuristicResolver<T> {
    threshold: f64,
    compatible: Compatible<T>,
}

impl<T> std::fmt::Debug for HeuristicResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeuristicResolver")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl<T: Renameable> HeuristicResolver<T> {
    /// Creates a resolver with the given similarity threshold.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            compatible: Box::new(|_, _| true),
        }
    }

    /// Restricts candidate pairs to those accepted by `compatible(deleted, created)`.
    #[must_use]
    pub fn with_compat(
        mut self,
        compatible: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.compatible = Box::new(compatible);
        self
    }
}

impl<T: Renameable> Default for HeuristicResolver<T> {
    fn default() -> Self {
        Self::new(RENAME_SIMILARITY_THRESHOLD)
    }
}

impl<T: Renameable> Resolver<T> for HeuristicResolver<T> {
    async fn resolve(&self, input: ResolverInput<T>) -> Result<ResolverOutput<T>> {
        let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
        for (d, old) in input.deleted.iter().enumerate() {
            for (c, new) in input.created.iter().enumerate() {
                if old.scope() != new.scope() || !(self.compatible)(old, new) {
                    continue;
                }
                let sim = similarity(old.name(), new.name());
                if sim >= self.threshold {
                    candidates.push((d, c, sim));
                }
            }
        }
        // Highest similarity first; the sort is stable so ties keep input order.
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut used_deleted = HashSet::new();
        let mut used_created = HashSet::new();
        let mut pairs = Vec::new();
        for (d, c, sim) in candidates {
            if used_deleted.contains(&d) || used_created.contains(&c) {
                continue;
            }
            debug!(
                from = %input.deleted[d].label(),
                to = %input.created[c].label(),
                similarity = sim,
                "Detected rename"
            );
            used_deleted.insert(d);
            used_created.insert(c);
            pairs.push((d, c));
        }

        let mut deleted: Vec<Option<T>> = input.deleted.into_iter().map(Some).collect();
        let mut created: Vec<Option<T>> = input.created.into_iter().map(Some).collect();
        let renamed = pairs
            .into_iter()
            .filter_map(|(d, c)| {
                Some(Renamed {
                    from: deleted[d].take()?,
                    to: created[c].take()?,
                })
            })
            .collect();

        Ok(ResolverOutput {
            created: created.into_iter().flatten().collect(),
            deleted: deleted.into_iter().flatten().collect(),
            renamed,
        })
    }
}

// ============================================================================
// Prompt
// ============================================================================

/// Answer of a [`RenamePrompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    /// The entity is new.
    Create,
    /// The entity is the deleted entity at this index, renamed.
    RenameFrom(usize),
}

/// Interactive source of rename decisions.
#[allow(async_fn_in_trait)]
pub trait RenamePrompt<T> {
    /// Asks whether `created` is new or replaces one of `deleted`.
    /// Returns `None` when the user cancels.
    async fn choose(&self, created: &T, deleted: &[T]) -> Option<PromptChoice>;
}

/// Resolves renames by asking a [`RenamePrompt`], one created entity at a
/// time, while deleted candidates remain.
#[derive(Debug, Clone)]
pub struct PromptResolver<P> {
    prompt: P,
}

impl<P> PromptResolver<P> {
    /// Wraps a prompt.
    #[must_use]
    pub fn new(prompt: P) -> Self {
        Self { prompt }
    }
}

impl<T: Renameable, P: RenamePrompt<T>> Resolver<T> for PromptResolver<P> {
    async fn resolve(&self, input: ResolverInput<T>) -> Result<ResolverOutput<T>> {
        let mut deleted = input.deleted;
        let mut created = Vec::new();
        let mut renamed = Vec::new();

        for entity in input.created {
            if deleted.is_empty() {
                created.push(entity);
                continue;
            }
            match self.prompt.choose(&entity, &deleted).await {
                None => return Err(DdlError::ResolverCancelled),
                Some(PromptChoice::Create) => created.push(entity),
                Some(PromptChoice::RenameFrom(i)) if i < deleted.len() => renamed.push(Renamed {
                    from: deleted.remove(i),
                    to: entity,
                }),
                Some(PromptChoice::RenameFrom(i)) => {
                    return Err(DdlError::Resolver(format!(
                        "prompt picked candidate {i} of {}",
                        deleted.len()
                    )))
                }
            }
        }

        Ok(ResolverOutput {
            created,
            deleted,
            renamed,
        })
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Runs `first`, then hands what it left unresolved to `second`.
#[derive(Debug, Clone)]
pub struct ChainResolver<A, B> {
    first: A,
    second: B,
}

impl<A, B> ChainResolver<A, B> {
    /// Chains two resolvers.
    #[must_use]
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<T, A, B> Resolver<T> for ChainResolver<A, B>
where
    A: Resolver<T>,
    B: Resolver<T>,
{
    async fn resolve(&self, input: ResolverInput<T>) -> Result<ResolverOutput<T>> {
        let first = self.first.resolve(input).await?;
        let mut second = self
            .second
            .resolve(ResolverInput {
                created: first.created,
                deleted: first.deleted,
            })
            .await?;
        let mut renamed = first.renamed;
        renamed.append(&mut second.renamed);
        Ok(ResolverOutput {
            created: second.created,
            deleted: second.deleted,
            renamed,
        })
    }
}
