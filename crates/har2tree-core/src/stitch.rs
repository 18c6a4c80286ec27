//! Multi-capture stitcher (C7): joins several resolved captures into one
//! tree by matching a sub-capture's root referer to another capture's
//! (possibly redirected) root URL.

use std::collections::{HashMap, HashSet};

use crate::node::URLNode;

/// One resolved capture plus the bookkeeping the stitcher needs: the
/// referer header of its very first request, and the URL this capture's
/// root is ultimately reachable at once its own initial redirect chain (if
/// any) is followed.
pub struct Capture {
    pub url_tree: URLNode,
    pub root_referrer: Option<String>,
    pub root_url: String,
    pub root_after_redirect: Option<String>,
}

impl Capture {
    fn anchor_key(&self) -> String {
        self.root_after_redirect
            .clone()
            .unwrap_or_else(|| self.root_url.clone())
    }
}

/// Join `captures` into a single tree rooted at the first capture. Captures
/// whose root referer never matches anything are left unattached (and
/// logged) rather than silently dropped.
pub fn join_trees(mut captures: Vec<Capture>) -> URLNode {
    let mut referers: HashMap<String, Vec<usize>> = HashMap::new();
    for i in 1..captures.len() {
        if let Some(r) = &captures[i].root_referrer {
            referers.entry(r.clone()).or_default().push(i);
        }
    }

    let mut attached: HashSet<usize> = HashSet::new();
    attached.insert(0);

    let extra = attach_matching(0, &mut captures, &mut referers, &mut attached);

    for (referer, remaining) in &referers {
        for idx in remaining {
            if !attached.contains(idx) {
                tracing::warn!(
                    referer = %referer,
                    capture_index = idx,
                    "capture's root referer never matched any known node; left unattached"
                );
            }
        }
    }

    let mut root_tree = captures[0].url_tree.clone();
    root_tree.children.extend(extra);
    root_tree
}

fn attach_matching(
    idx: usize,
    captures: &mut Vec<Capture>,
    referers: &mut HashMap<String, Vec<usize>>,
    attached: &mut HashSet<usize>,
) -> Vec<URLNode> {
    let key = captures[idx].anchor_key();
    let Some(candidates) = referers.remove(&key) else {
        return Vec::new();
    };

    let mut extra_children = Vec::new();
    for cand_idx in candidates {
        if attached.contains(&cand_idx) {
            continue;
        }
        attached.insert(cand_idx);
        let mut sub_tree = captures[cand_idx].url_tree.clone();
        let grandchildren = attach_matching(cand_idx, captures, referers, attached);
        sub_tree.children.extend(grandchildren);
        extra_children.push(sub_tree);
    }
    extra_children
}
