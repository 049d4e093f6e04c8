//! Dependency graph between form fields
//!
//! Fields live in an arena indexed by their position in the field list;
//! edges are adjacency lists of indices in both directions. An edge
//! `field -> dependency` means one of the field's expressions references the
//! dependency by name. Names that are not fields are external inputs and
//! produce no edge.

use crate::error::{FormulaError, FormulaResult};
use crate::parser::parse_expression_with;
use crate::safety::ParseOptions;
use ahash::AHashMap;
use formcalc_core::FieldDefinition;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use tracing::warn;

/// Which expression of a field produced an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Formula,
    Options,
    Condition,
    CrossField,
}

impl EdgeKind {
    pub fn name(self) -> &'static str {
        match self {
            EdgeKind::Formula => "formula",
            EdgeKind::Options => "options",
            EdgeKind::Condition => "condition",
            EdgeKind::CrossField => "cross-field",
        }
    }
}

/// `field` references `depends_on` through its `kind` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub field: String,
    pub depends_on: String,
    pub kind: EdgeKind,
}

/// An expression that failed to parse and contributes no edges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedExpression {
    pub field: String,
    pub kind: EdgeKind,
    pub error: FormulaError,
}

/// Summary numbers for authoring tools
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub total_fields: usize,
    pub calculated_fields: usize,
    pub total_dependencies: usize,
    /// Longest chain of dependencies
    pub max_depth: usize,
    /// Fields that depend on nothing
    pub root_fields: Vec<String>,
    /// Fields nothing depends on
    pub leaf_fields: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Acyclic dependency graph over a field set
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Field names in definition order
    names: Vec<String>,
    index: AHashMap<String, usize>,
    /// Field -> fields it references
    precedents: Vec<Vec<usize>>,
    /// Field -> fields that reference it
    dependents: Vec<Vec<usize>>,
    calculated: Vec<bool>,
    edges: Vec<DependencyEdge>,
    skipped: Vec<SkippedExpression>,
}

impl DependencyGraph {
    /// Build the graph for `fields` with default parse limits
    pub fn build(fields: &[FieldDefinition]) -> FormulaResult<Self> {
        Self::build_with(fields, &ParseOptions::default())
    }

    /// Build the graph, failing with `CycleDetected` if fields depend on
    /// each other in a loop
    pub fn build_with(fields: &[FieldDefinition], options: &ParseOptions) -> FormulaResult<Self> {
        let mut graph = Self::default();

        for (i, field) in fields.iter().enumerate() {
            if graph.index.insert(field.name.clone(), i).is_some() {
                return Err(FormulaError::DuplicateField(field.name.clone()));
            }
            graph.names.push(field.name.clone());
            graph.calculated.push(field.is_calculated());
        }
        graph.precedents = vec![Vec::new(); fields.len()];
        graph.dependents = vec![Vec::new(); fields.len()];

        for (i, field) in fields.iter().enumerate() {
            for (kind, text) in expressions_of(field) {
                let expr = match parse_expression_with(text, options) {
                    Ok(expr) => expr,
                    Err(error) => {
                        warn!(field = %field.name, kind = kind.name(), %error, "skipping unparsable expression");
                        graph.skipped.push(SkippedExpression {
                            field: field.name.clone(),
                            kind,
                            error,
                        });
                        continue;
                    }
                };

                for name in expr.variables() {
                    let Some(&dep) = graph.index.get(name) else {
                        continue;
                    };
                    if dep == i {
                        // A rule may check its own field's value; a
                        // computed value may not read itself
                        match kind {
                            EdgeKind::Formula | EdgeKind::Options => {
                                return Err(FormulaError::CycleDetected {
                                    path: vec![field.name.clone(), field.name.clone()],
                                });
                            }
                            EdgeKind::Condition | EdgeKind::CrossField => continue,
                        }
                    }
                    graph.add_dependency(i, dep, kind);
                }
            }
        }

        graph.detect_cycles()?;
        Ok(graph)
    }

    fn add_dependency(&mut self, field: usize, dep: usize, kind: EdgeKind) {
        let edge = DependencyEdge {
            field: self.names[field].clone(),
            depends_on: self.names[dep].clone(),
            kind,
        };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        if !self.precedents[field].contains(&dep) {
            self.precedents[field].push(dep);
            self.dependents[dep].push(field);
        }
    }

    // === Cycle detection ===

    /// Three-color depth-first search over precedents; reaching a gray
    /// node closes a cycle, reported with its full path.
    fn detect_cycles(&self) -> FormulaResult<()> {
        let mut colors = vec![Color::White; self.names.len()];
        let mut stack = Vec::new();

        for start in 0..self.names.len() {
            if colors[start] == Color::White {
                self.visit(start, &mut colors, &mut stack)?;
            }
        }
        Ok(())
    }

    fn visit(&self, node: usize, colors: &mut [Color], stack: &mut Vec<usize>) -> FormulaResult<()> {
        colors[node] = Color::Gray;
        stack.push(node);

        for &next in &self.precedents[node] {
            match colors[next] {
                Color::Gray => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[start..].iter().map(|&n| self.names[n].clone()).collect();
                    path.push(self.names[next].clone());
                    return Err(FormulaError::CycleDetected { path });
                }
                Color::White => self.visit(next, colors, stack)?,
                Color::Black => {}
            }
        }

        stack.pop();
        colors[node] = Color::Black;
        Ok(())
    }

    // === Ordering ===

    /// Order the given field indices so every field comes after the fields
    /// it depends on (Kahn's algorithm restricted to the subset; ties keep
    /// definition order)
    fn order_subset(&self, subset: &[bool]) -> Vec<usize> {
        let mut in_degree: Vec<usize> = (0..self.names.len())
            .map(|i| {
                self.precedents[i]
                    .iter()
                    .filter(|&&p| subset[p])
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = (0..self.names.len())
            .filter(|&i| subset[i] && in_degree[i] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::new();
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &dependent in &self.dependents[node] {
                if !subset[dependent] {
                    continue;
                }
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }
        order
    }

    /// Every field, dependencies first
    pub fn topological_order(&self) -> Vec<&str> {
        let all = vec![true; self.names.len()];
        self.names_of(self.order_subset(&all))
    }

    /// Fields transitively depending on `field`, in evaluation order
    /// (the field itself excluded)
    pub fn affected_by(&self, field: &str) -> Vec<&str> {
        self.names_of(self.order_subset(&self.reachable_dependents(field)))
    }

    /// Calculated fields to evaluate, in order: all of them when `changed`
    /// is None, otherwise those transitively depending on `changed`
    pub fn calculation_order(&self, changed: Option<&str>) -> Vec<&str> {
        let mut subset = match changed {
            None => vec![true; self.names.len()],
            Some(field) => self.reachable_dependents(field),
        };
        for (i, selected) in subset.iter_mut().enumerate() {
            *selected &= self.calculated[i];
        }
        self.names_of(self.order_subset(&subset))
    }

    fn reachable_dependents(&self, field: &str) -> Vec<bool> {
        let mut seen = vec![false; self.names.len()];
        let Some(&start) = self.index.get(field) else {
            return seen;
        };
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &dependent in &self.dependents[node] {
                if !seen[dependent] && dependent != start {
                    seen[dependent] = true;
                    queue.push_back(dependent);
                }
            }
        }
        seen
    }

    fn names_of(&self, indices: Vec<usize>) -> Vec<&str> {
        indices.into_iter().map(|i| self.names[i].as_str()).collect()
    }

    // === Queries ===

    pub fn contains(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Field names in definition order
    pub fn field_names(&self) -> &[String] {
        &self.names
    }

    /// Fields that `field` references directly
    pub fn dependencies_of(&self, field: &str) -> Vec<&str> {
        self.index
            .get(field)
            .map(|&i| self.precedents[i].iter().map(|&p| self.names[p].as_str()).collect())
            .unwrap_or_default()
    }

    /// Fields that reference `field` directly
    pub fn dependents_of(&self, field: &str) -> Vec<&str> {
        self.index
            .get(field)
            .map(|&i| self.dependents[i].iter().map(|&d| self.names[d].as_str()).collect())
            .unwrap_or_default()
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Expressions that failed to parse while building
    pub fn skipped(&self) -> &[SkippedExpression] {
        &self.skipped
    }

    /// Check whether making `field` reference `depends_on` would close a loop
    pub fn would_create_cycle(&self, field: &str, depends_on: &str) -> bool {
        if field == depends_on {
            return true;
        }
        match (self.index.get(field), self.index.get(depends_on)) {
            // A loop appears if `depends_on` already reaches `field`
            (Some(&target), Some(&from)) => {
                let mut seen = vec![false; self.names.len()];
                let mut queue = VecDeque::from([from]);
                while let Some(node) = queue.pop_front() {
                    if node == target {
                        return true;
                    }
                    for &p in &self.precedents[node] {
                        if !seen[p] {
                            seen[p] = true;
                            queue.push_back(p);
                        }
                    }
                }
                false
            }
            _ => false,
        }
    }

    pub fn stats(&self) -> GraphStats {
        let all = vec![true; self.names.len()];
        let mut depth = vec![0usize; self.names.len()];
        for node in self.order_subset(&all) {
            depth[node] = self.precedents[node]
                .iter()
                .map(|&p| depth[p] + 1)
                .max()
                .unwrap_or(0);
        }

        GraphStats {
            total_fields: self.names.len(),
            calculated_fields: self.calculated.iter().filter(|&&c| c).count(),
            total_dependencies: self.precedents.iter().map(Vec::len).sum(),
            max_depth: depth.into_iter().max().unwrap_or(0),
            root_fields: (0..self.names.len())
                .filter(|&i| self.precedents[i].is_empty())
                .map(|i| self.names[i].clone())
                .collect(),
            leaf_fields: (0..self.names.len())
                .filter(|&i| self.dependents[i].is_empty())
                .map(|i| self.names[i].clone())
                .collect(),
        }
    }
}

fn expressions_of(field: &FieldDefinition) -> Vec<(EdgeKind, &str)> {
    let mut expressions = Vec::new();
    if let Some(formula) = &field.formula {
        expressions.push((EdgeKind::Formula, formula.text.as_str()));
    }
    if let Some(options) = &field.dynamic_options {
        expressions.push((EdgeKind::Options, options.as_str()));
    }
    if let Some(conditional) = &field.conditional_validation {
        expressions.push((EdgeKind::Condition, conditional.condition.as_str()));
    }
    if let Some(cross) = &field.cross_field_validation {
        expressions.push((EdgeKind::CrossField, cross.expression.as_str()));
    }
    expressions
}

#[cfg(test)]
mod tests {
    use super::*;
    use formcalc_core::FieldType;
    use pretty_assertions::assert_eq;

    fn invoice() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::new("total", FieldType::Number).with_formula("subtotal - discount"),
            FieldDefinition::new("discount", FieldType::Number).with_formula("subtotal * (pct / 100)"),
            FieldDefinition::new("subtotal", FieldType::Number).with_formula("quantity * unitPrice"),
            FieldDefinition::new("quantity", FieldType::Number),
            FieldDefinition::new("unitPrice", FieldType::Number),
            FieldDefinition::new("pct", FieldType::Number),
        ]
    }

    #[test]
    fn test_add_dependency() {
        let graph = DependencyGraph::build(&invoice()).unwrap();

        assert_eq!(graph.dependencies_of("total"), vec!["discount", "subtotal"]);
        assert_eq!(graph.dependents_of("subtotal"), vec!["total", "discount"]);
        assert!(graph.dependencies_of("quantity").is_empty());
        assert_eq!(graph.edges().len(), 6);
    }

    #[test]
    fn test_unknown_names_are_not_edges() {
        let fields = vec![
            FieldDefinition::new("fee", FieldType::Number).with_formula("amount * externalRate"),
            FieldDefinition::new("amount", FieldType::Number),
        ];
        let graph = DependencyGraph::build(&fields).unwrap();
        assert_eq!(graph.dependencies_of("fee"), vec!["amount"]);
        assert!(!graph.contains("externalRate"));
    }

    #[test]
    fn test_topological_order() {
        let graph = DependencyGraph::build(&invoice()).unwrap();
        let order = graph.topological_order();
        let pos = |name: &str| order.iter().position(|n| *n == name).unwrap();

        assert!(pos("quantity") < pos("subtotal"));
        assert!(pos("subtotal") < pos("discount"));
        assert!(pos("discount") < pos("total"));
        assert_eq!(order.len(), 6);
    }

    #[test]
    fn test_calculation_order() {
        let graph = DependencyGraph::build(&invoice()).unwrap();
        assert_eq!(graph.calculation_order(None), vec!["subtotal", "discount", "total"]);
        assert_eq!(
            graph.calculation_order(Some("quantity")),
            vec!["subtotal", "discount", "total"]
        );
        assert_eq!(graph.calculation_order(Some("pct")), vec!["discount", "total"]);
        assert!(graph.calculation_order(Some("total")).is_empty());
        assert!(graph.calculation_order(Some("nope")).is_empty());
    }

    #[test]
    fn test_circular_reference() {
        let fields = vec![
            FieldDefinition::new("a", FieldType::Number).with_formula("b + 1"),
            FieldDefinition::new("b", FieldType::Number).with_formula("a + 1"),
        ];
        assert_eq!(
            DependencyGraph::build(&fields).unwrap_err(),
            FormulaError::CycleDetected {
                path: vec!["a".into(), "b".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_cycle_path_is_complete() {
        // A1 -> B1 -> C1 -> A1 (circular), entered through x
        let fields = vec![
            FieldDefinition::new("x", FieldType::Number).with_formula("a"),
            FieldDefinition::new("a", FieldType::Number).with_formula("b"),
            FieldDefinition::new("b", FieldType::Number).with_formula("c"),
            FieldDefinition::new("c", FieldType::Number).with_dynamic_options("IF(a > 1, STATIC('[]'), null)"),
        ];
        let err = DependencyGraph::build(&fields).unwrap_err();
        assert_eq!(
            err,
            FormulaError::CycleDetected {
                path: vec!["a".into(), "b".into(), "c".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_self_reference_in_rules_is_not_an_edge() {
        let fields = vec![FieldDefinition::new("age", FieldType::Number)
            .with_condition("age > 0", vec![formcalc_core::ValidationRule::new("required")])
            .with_cross_field("age >= 18", "Must be an adult")];
        let graph = DependencyGraph::build(&fields).unwrap();
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_self_reference_in_formula_is_a_cycle() {
        let fields = vec![FieldDefinition::new("a", FieldType::Number).with_formula("a + 1")];
        assert_eq!(
            DependencyGraph::build(&fields).unwrap_err(),
            FormulaError::CycleDetected {
                path: vec!["a".into(), "a".into()]
            }
        );

        let fields = vec![FieldDefinition::new("tags", FieldType::Select)
            .with_dynamic_options("IF(IS_NULL(tags), STATIC('[]'), null)")];
        assert!(matches!(
            DependencyGraph::build(&fields),
            Err(FormulaError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_all_expression_kinds_produce_edges() {
        let fields = vec![
            FieldDefinition::new("country", FieldType::Select),
            FieldDefinition::new("state", FieldType::Select)
                .with_dynamic_options("IF(country == 'US', STATIC('[\"TX\"]'), null)"),
            FieldDefinition::new("zip", FieldType::Text)
                .with_condition("country == 'US'", vec![formcalc_core::ValidationRule::new("required")]),
            FieldDefinition::new("confirm", FieldType::Text).with_cross_field("confirm == zip", "Must match"),
        ];
        let graph = DependencyGraph::build(&fields).unwrap();
        let kinds: Vec<_> = graph.edges().iter().map(|e| (e.field.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("state", EdgeKind::Options),
                ("zip", EdgeKind::Condition),
                ("confirm", EdgeKind::CrossField),
            ]
        );
    }

    #[test]
    fn test_unparsable_expression_is_skipped() {
        let mut fields = invoice();
        fields[1] = FieldDefinition::new("discount", FieldType::Number).with_formula("subtotal * (pct / 100");
        let graph = DependencyGraph::build(&fields).unwrap();
        assert_eq!(graph.skipped().len(), 1);
        assert_eq!(graph.skipped()[0].field, "discount");
        assert!(graph.dependencies_of("discount").is_empty());
    }

    #[test]
    fn test_duplicate_field() {
        let fields = vec![
            FieldDefinition::new("a", FieldType::Number),
            FieldDefinition::new("a", FieldType::Text),
        ];
        assert_eq!(
            DependencyGraph::build(&fields).unwrap_err(),
            FormulaError::DuplicateField("a".into())
        );
    }

    #[test]
    fn test_would_create_cycle() {
        let graph = DependencyGraph::build(&invoice()).unwrap();
        assert!(graph.would_create_cycle("subtotal", "total"));
        assert!(graph.would_create_cycle("pct", "pct"));
        assert!(!graph.would_create_cycle("total", "pct"));
    }

    #[test]
    fn test_stats() {
        let stats = DependencyGraph::build(&invoice()).unwrap().stats();
        assert_eq!(stats.total_fields, 6);
        assert_eq!(stats.calculated_fields, 3);
        assert_eq!(stats.total_dependencies, 6);
        assert_eq!(stats.max_depth, 3);
        assert_eq!(stats.root_fields, vec!["quantity", "unitPrice", "pct"]);
        assert_eq!(stats.leaf_fields, vec!["total"]);
    }
}
