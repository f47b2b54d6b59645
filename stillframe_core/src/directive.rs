// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transition directives: what a saved-frame capture must produce.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use crate::id::{ElementResourceId, RenderPassId};

/// One shared element named by a [`TransitionDirective`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SharedElement {
    /// The render pass that produced this element's pixels, or `None` if the
    /// element produced no visible output in this frame.
    pub render_pass_id: Option<RenderPassId>,
    /// Consumer-visible resource slot for this element.
    pub resource_id: ElementResourceId,
}

impl SharedElement {
    /// An element backed by `render_pass_id`.
    #[must_use]
    pub const fn new(render_pass_id: RenderPassId, resource_id: ElementResourceId) -> Self {
        Self {
            render_pass_id: Some(render_pass_id),
            resource_id,
        }
    }

    /// An element that was not rendered this frame.
    #[must_use]
    pub const fn empty(resource_id: ElementResourceId) -> Self {
        Self {
            render_pass_id: None,
            resource_id,
        }
    }
}

/// Immutable description of a capture: an ordered list of shared elements.
///
/// Slot indices used throughout the capture pipeline are positions in
/// [`shared_elements`](Self::shared_elements).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransitionDirective {
    sequence_id: u32,
    shared_elements: Vec<SharedElement>,
}

impl TransitionDirective {
    /// Creates a directive.
    ///
    /// `sequence_id` distinguishes successive directives from the same
    /// source; it is carried through to diagnostics.
    #[must_use]
    pub fn new(sequence_id: u32, shared_elements: Vec<SharedElement>) -> Self {
        Self {
            sequence_id,
            shared_elements,
        }
    }

    /// Returns the directive's sequence id.
    #[inline]
    #[must_use]
    pub const fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    /// Returns the shared elements in directive order.
    #[inline]
    #[must_use]
    pub fn shared_elements(&self) -> &[SharedElement] {
        &self.shared_elements
    }

    /// Number of distinct render passes referenced by the shared elements.
    ///
    /// Two elements that reference the same pass count once.
    #[must_use]
    pub fn expected_result_count(&self) -> usize {
        self.shared_elements
            .iter()
            .filter_map(|element| element.render_pass_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Resource ids of every element that has no render pass.
    ///
    /// These are known to be empty before any copy is issued.
    #[must_use]
    pub fn empty_resource_ids(&self) -> BTreeSet<ElementResourceId> {
        self.shared_elements
            .iter()
            .filter(|element| element.render_pass_id.is_none())
            .map(|element| element.resource_id)
            .collect()
    }

    /// Slot indices of the elements that reference `render_pass_id`, in
    /// directive order.
    pub fn slots_for_render_pass(
        &self,
        render_pass_id: RenderPassId,
    ) -> impl Iterator<Item = usize> + '_ {
        self.shared_elements
            .iter()
            .enumerate()
            .filter(move |(_, element)| element.render_pass_id == Some(render_pass_id))
            .map(|(slot, _)| slot)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn directive() -> TransitionDirective {
        TransitionDirective::new(
            7,
            vec![
                SharedElement::new(RenderPassId(1), ElementResourceId(10)),
                SharedElement::empty(ElementResourceId(11)),
                SharedElement::new(RenderPassId(2), ElementResourceId(12)),
                SharedElement::new(RenderPassId(1), ElementResourceId(13)),
            ],
        )
    }

    #[test]
    fn expected_count_deduplicates_render_passes() {
        assert_eq!(directive().expected_result_count(), 2);
    }

    #[test]
    fn empty_resource_ids_are_null_pass_elements() {
        let ids: Vec<_> = directive().empty_resource_ids().into_iter().collect();
        assert_eq!(ids, [ElementResourceId(11)]);
    }

    #[test]
    fn slots_for_render_pass_follow_directive_order() {
        let d = directive();
        let slots: Vec<_> = d.slots_for_render_pass(RenderPassId(1)).collect();
        assert_eq!(slots, [0, 3]);
        assert_eq!(d.slots_for_render_pass(RenderPassId(9)).count(), 0);
    }

    #[test]
    fn all_null_directive_expects_nothing() {
        let d = TransitionDirective::new(
            1,
            vec![
                SharedElement::empty(ElementResourceId(1)),
                SharedElement::empty(ElementResourceId(2)),
            ],
        );
        assert_eq!(d.expected_result_count(), 0);
        assert_eq!(d.empty_resource_ids().len(), 2);
    }
}
