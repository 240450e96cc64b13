// SPDX-License-Identifier: Apache-2.0

//! Ownership planning.
//!
//! Annotates a query tree bottom-up with the drivers owning each subtree.
//! The plan mirrors `Element::children()` so the router can walk both in
//! step. Every name is resolved here, before anything is dispatched.

use requester_query::{Crud, Element, FuncName};

use super::resolve::Resolver;
use super::types::{DriverSet, Ownership};
use crate::engine::error::EngineResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    pub ownership: Ownership,
    /// Drivers that execute the node itself when it is mixed: the call's
    /// own backend, or every driver of a mixed CRUD.
    pub anchor: Option<DriverSet>,
    /// Plans of the routed children: every child of a function, only an
    /// owned or mixed filter of a CRUD.
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    fn leaf(ownership: Ownership) -> Self {
        Self {
            ownership,
            anchor: None,
            children: Vec::new(),
        }
    }

    /// Number of partition tops in the plan.
    pub fn partition_count(&self) -> usize {
        match self.ownership {
            Ownership::Owned(_) | Ownership::Neutral => 1,
            Ownership::Mixed(_) => {
                let below: usize = self.children.iter().map(PlanNode::partition_count).sum();
                below + usize::from(self.anchor.is_some())
            }
        }
    }
}

/// Builds the ownership plan of `node`.
pub fn plan(node: &Element, resolver: &mut Resolver<'_>) -> EngineResult<PlanNode> {
    match node {
        Element::Expression(expr) => {
            let owners = resolver.resolve(expr.name())?;
            Ok(PlanNode::leaf(Ownership::Owned(owners)))
        }
        Element::Function(func) => {
            let children = plan_all(node.children(), resolver)?;
            let combined = combine(&children, resolver);
            match func.name() {
                FuncName::Call(path) => {
                    let own = resolver.resolve(path)?;
                    let ownership = Ownership::Owned(own.clone()).combine(combined, |n| resolver.rank(n));
                    let anchor = matches!(ownership, Ownership::Mixed(_)).then_some(own);
                    Ok(PlanNode {
                        ownership,
                        anchor,
                        children,
                    })
                }
                _ => Ok(PlanNode {
                    ownership: combined,
                    anchor: None,
                    children,
                }),
            }
        }
        Element::Crud(crud) => plan_crud(crud, resolver),
    }
}

fn plan_all(nodes: Vec<&Element>, resolver: &mut Resolver<'_>) -> EngineResult<Vec<PlanNode>> {
    nodes.into_iter().map(|child| plan(child, resolver)).collect()
}

fn combine(children: &[PlanNode], resolver: &Resolver<'_>) -> Ownership {
    children.iter().fold(Ownership::Neutral, |acc, child| {
        acc.combine(child.ownership.clone(), |n| resolver.rank(n))
    })
}

/// A CRUD belongs to the owners of its filter. Without a routable filter it
/// falls back to the fields it targets, selects or assigns.
fn plan_crud(crud: &Crud, resolver: &mut Resolver<'_>) -> EngineResult<PlanNode> {
    let filter = match crud.query() {
        Some(query) => Some(plan(query, resolver)?),
        None => None,
    };

    let ownership = match filter.as_ref().map(|f| &f.ownership) {
        Some(owned @ (Ownership::Owned(_) | Ownership::Mixed(_))) => owned.clone(),
        _ => {
            let mut fallback = Ownership::Neutral;
            for target in crud.targets() {
                let owners = resolver.resolve(target.name())?;
                fallback = fallback.combine(Ownership::Owned(owners), |n| resolver.rank(n));
            }
            let skip = usize::from(crud.query().is_some());
            for child in crud.children().into_iter().skip(skip) {
                let child_plan = plan(child, resolver)?;
                fallback = fallback.combine(child_plan.ownership, |n| resolver.rank(n));
            }
            fallback
        }
    };

    let anchor = match &ownership {
        Ownership::Mixed(all) => Some(all.clone()),
        _ => None,
    };
    Ok(PlanNode {
        ownership,
        anchor,
        // A neutral filter travels inside the CRUD to every anchor driver.
        children: filter
            .into_iter()
            .filter(|f| !f.ownership.is_neutral())
            .collect(),
    })
}
