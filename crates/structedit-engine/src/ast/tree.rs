//! Arena-backed construct tree.
//!
//! Nodes live in a flat arena and refer to each other through [`NodeId`]
//! handles; the parent link is a plain non-owning back-reference, so the
//! parent/child "cycle" needs no special ownership treatment. All structural
//! mutation goes through this type, which keeps the index invariant
//! (`tree.children(parent)[child.index_in_parent] == child`) intact
//! atomically and queues notifications for the session to dispatch.

use crate::ast::node::{
    Compound, Construct, Node, NodeId, NodeKind, Slot, Token, TokenKind, TAB_WIDTH,
};
use crate::ast::scope::Scope;
use crate::editing::events::{Notification, NotifyKind};
use structedit_grammar::{DefId, FormatToken, Grammar};

/// Leading whitespace for one body nesting level.
pub fn indent(level: usize) -> String {
    " ".repeat(level * TAB_WIDTH)
}

#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    pending: Vec<Notification>,
}

impl Tree {
    /// A module with a single editable blank line.
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            pending: Vec::new(),
        };
        let root = tree.alloc(NodeKind::Module {
            body: Vec::new(),
            scope: Scope::new(),
        });
        tree.root = root;
        let line = tree.alloc(NodeKind::EmptyLine { autocomplete: None });
        tree.attach(root, Slot::Body, 0, line);
        match &mut tree.nodes[root.index()].kind {
            NodeKind::Module { body, .. } => body.push(line),
            _ => unreachable!(),
        }
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind));
        id
    }

    pub(crate) fn notify(&mut self, node: NodeId, kind: NotifyKind) {
        self.pending.push(Notification { node, kind });
    }

    /// Notifications queued by structural mutations since the last drain.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }

    // ---- child access ----------------------------------------------------

    pub fn tokens_of(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Construct(c) => &c.tokens,
            NodeKind::Compound(c) => &c.tokens,
            _ => &[],
        }
    }

    pub fn body_of(&self, id: NodeId) -> Option<&[NodeId]> {
        match &self.node(id).kind {
            NodeKind::Module { body, .. } => Some(body),
            NodeKind::Construct(Construct { body: Some(b), .. }) => Some(b),
            _ => None,
        }
    }

    pub fn children(&self, id: NodeId, slot: Slot) -> &[NodeId] {
        match slot {
            Slot::Tokens => self.tokens_of(id),
            Slot::Body => self.body_of(id).unwrap_or(&[]),
        }
    }

    fn children_mut(&mut self, id: NodeId, slot: Slot) -> &mut Vec<NodeId> {
        match (&mut self.nodes[id.index()].kind, slot) {
            (NodeKind::Construct(c), Slot::Tokens) => &mut c.tokens,
            (NodeKind::Compound(c), Slot::Tokens) => &mut c.tokens,
            (NodeKind::Construct(Construct { body: Some(b), .. }), Slot::Body) => b,
            (NodeKind::Module { body, .. }, Slot::Body) => body,
            (kind, slot) => panic!("node has no {slot:?} children: {kind:?}"),
        }
    }

    pub fn def_of(&self, id: NodeId) -> Option<DefId> {
        match &self.node(id).kind {
            NodeKind::Construct(c) => Some(c.def),
            NodeKind::Compound(c) => Some(c.def),
            _ => None,
        }
    }

    pub fn keyword_of<'g>(&self, id: NodeId, grammar: &'g Grammar) -> Option<&'g str> {
        self.def_of(id).map(|d| grammar.def(d).keyword.as_str())
    }

    /// Body nesting level: 0 for module-level statements and their tokens.
    pub fn indent_level(&self, id: NodeId) -> usize {
        let mut level = 0usize;
        let mut cur = id;
        while let Some(parent) = self.node(cur).parent {
            if self.node(cur).slot == Slot::Body {
                level += 1;
            }
            cur = parent;
        }
        level.saturating_sub(1)
    }

    /// Nearest enclosing statement: the ancestor (or `id` itself) sitting in
    /// a body list.
    pub fn enclosing_statement(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = id;
        loop {
            let node = self.node(cur);
            if node.slot == Slot::Body && node.parent.is_some() {
                return Some(cur);
            }
            cur = node.parent?;
        }
    }

    // ---- linking ---------------------------------------------------------

    fn attach(&mut self, parent: NodeId, slot: Slot, index: usize, child: NodeId) {
        let node = self.node_mut(child);
        node.parent = Some(parent);
        node.slot = slot;
        node.index_in_parent = index;
    }

    fn detach(&mut self, child: NodeId) {
        let node = self.node_mut(child);
        node.parent = None;
        node.index_in_parent = 0;
    }

    fn renumber(&mut self, parent: NodeId, slot: Slot, from: usize) {
        let children: Vec<NodeId> = self.children(parent, slot)[from..].to_vec();
        for (offset, child) in children.into_iter().enumerate() {
            self.node_mut(child).index_in_parent = from + offset;
        }
    }

    // ---- structural mutation --------------------------------------------

    /// Swap the child at `index` for `new`. The old child's subtree receives
    /// `Delete` notifications (and releases its scope bindings) before the
    /// removal is observable; the new child is fully linked on return.
    /// Callers must rebuild from the replaced position afterwards.
    pub fn replace(&mut self, parent: NodeId, slot: Slot, index: usize, new: NodeId) -> NodeId {
        let old = self.children(parent, slot)[index];
        self.notify_subtree_delete(old);
        self.release_bindings(old, parent);
        self.notify(parent, NotifyKind::Replace);
        self.children_mut(parent, slot)[index] = new;
        self.detach(old);
        self.attach(parent, slot, index, new);
        old
    }

    /// Splice a statement into a body list, renumbering later siblings.
    pub fn insert_body_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.children_mut(parent, Slot::Body).insert(index, child);
        self.attach(parent, Slot::Body, index, child);
        self.renumber(parent, Slot::Body, index + 1);
        self.notify(parent, NotifyKind::Change);
    }

    /// Remove a statement from a body list, renumbering later siblings.
    pub fn remove_body_child(&mut self, parent: NodeId, index: usize) -> NodeId {
        let old = self.children(parent, Slot::Body)[index];
        self.notify_subtree_delete(old);
        self.release_bindings(old, parent);
        self.children_mut(parent, Slot::Body).remove(index);
        self.detach(old);
        self.renumber(parent, Slot::Body, index);
        self.notify(parent, NotifyKind::Change);
        old
    }

    /// Attach or clear the transient autocomplete token on a blank line.
    pub fn set_autocomplete(&mut self, line: NodeId, token: Option<NodeId>) {
        let old = match &mut self.nodes[line.index()].kind {
            NodeKind::EmptyLine { autocomplete } => std::mem::replace(autocomplete, token),
            _ => return,
        };
        if let Some(t) = old {
            self.notify(t, NotifyKind::Delete);
            self.detach(t);
        }
        if let Some(t) = token {
            self.attach(line, Slot::Tokens, 0, t);
        }
        self.notify(line, NotifyKind::Change);
    }

    fn notify_subtree_delete(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            self.notify(cur, NotifyKind::Delete);
            stack.extend(self.tokens_of(cur).iter().copied());
            if let Some(body) = self.body_of(cur) {
                stack.extend(body.iter().copied());
            }
            if let NodeKind::EmptyLine {
                autocomplete: Some(tkn),
            } = self.node(cur).kind
            {
                stack.push(tkn);
            }
        }
    }

    /// Unregister every assignment binding held by a subtree about to leave
    /// the tree. `above` is the node the subtree hangs off, used to find the
    /// scope the bindings were registered in.
    fn release_bindings(&mut self, id: NodeId, above: NodeId) {
        let mut names = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let NodeKind::Token(Token {
                kind: TokenKind::Assignment,
                text,
            }) = &self.node(cur).kind
            {
                if !text.is_empty() {
                    names.push(text.clone());
                }
            }
            stack.extend(self.tokens_of(cur).iter().copied());
            if let Some(body) = self.body_of(cur) {
                stack.extend(body.iter().copied());
            }
        }
        for name in names {
            let owner = self.nearest_scope_owner(above);
            if let Some(scope) = self.scope_mut(owner) {
                scope.unregister(&name);
            }
        }
    }

    // ---- instantiation ---------------------------------------------------

    /// Materialize a construct from its grammar definition: tokens from the
    /// format, a fresh blank line if the definition carries a body, a fresh
    /// scope if it introduces one.
    pub fn instantiate(&mut self, grammar: &Grammar, def_id: DefId) -> NodeId {
        let format = grammar.def(def_id).format.clone();
        let has_body = grammar.def(def_id).has_body();
        let introduces_scope = grammar.def(def_id).introduces_scope;

        let mut tokens = Vec::new();
        for fmt in &format {
            match fmt {
                FormatToken::Body => {}
                FormatToken::Repeating { trigger, cycle } => {
                    let compound = self.alloc(NodeKind::Compound(Compound {
                        def: def_id,
                        trigger: *trigger,
                        cycle: cycle.clone(),
                        cycle_index: 0,
                        tokens: Vec::new(),
                    }));
                    tokens.push(compound);
                }
                other => {
                    let token = token_for_format(other)
                        .expect("grammar validation leaves only token formats");
                    tokens.push(self.alloc(NodeKind::Token(token)));
                }
            }
        }

        let body = if has_body {
            let line = self.alloc(NodeKind::EmptyLine { autocomplete: None });
            Some(vec![line])
        } else {
            None
        };

        let construct = self.alloc(NodeKind::Construct(Construct {
            def: def_id,
            tokens: tokens.clone(),
            body: body.clone(),
            scope: introduces_scope.then(Scope::new),
        }));

        for (i, t) in tokens.iter().enumerate() {
            self.attach(construct, Slot::Tokens, i, *t);
        }
        if let Some(body) = body {
            for (i, line) in body.iter().enumerate() {
                self.attach(construct, Slot::Body, i, *line);
            }
        }
        construct
    }

    /// Append one cycle of tokens to a compound. Returns the new tokens.
    pub fn grow_compound(&mut self, id: NodeId) -> Vec<NodeId> {
        let cycle = match &self.node(id).kind {
            NodeKind::Compound(c) => c.cycle.clone(),
            _ => return Vec::new(),
        };
        let mut grown = Vec::new();
        for fmt in &cycle {
            if let Some(token) = token_for_format(fmt) {
                grown.push(self.alloc(NodeKind::Token(token)));
            }
        }
        let start = self.tokens_of(id).len();
        for (i, t) in grown.iter().enumerate() {
            self.attach(id, Slot::Tokens, start + i, *t);
        }
        if let NodeKind::Compound(c) = &mut self.nodes[id.index()].kind {
            c.tokens.extend(grown.iter().copied());
            c.cycle_index += 1;
        }
        self.notify(id, NotifyKind::Change);
        grown
    }

    /// Drop the last cycle of a compound if every token in it is still
    /// unfilled. Returns whether anything was removed.
    pub fn shrink_compound(&mut self, id: NodeId) -> bool {
        let (cycle_len, cycle_index, tokens) = match &self.node(id).kind {
            NodeKind::Compound(c) => (c.cycle.len(), c.cycle_index, c.tokens.clone()),
            _ => return false,
        };
        if cycle_index == 0 || tokens.len() < cycle_len {
            return false;
        }
        let tail = &tokens[tokens.len() - cycle_len..];
        let removable = tail.iter().all(|t| match self.node(*t).as_token() {
            Some(tkn) => tkn.is_empty() || matches!(tkn.kind, TokenKind::NonEditable),
            None => false,
        });
        if !removable {
            return false;
        }
        for t in tail {
            self.notify(*t, NotifyKind::Delete);
        }
        let tail: Vec<NodeId> = tail.to_vec();
        if let NodeKind::Compound(c) = &mut self.nodes[id.index()].kind {
            c.tokens.truncate(c.tokens.len() - cycle_len);
            c.cycle_index -= 1;
        }
        for t in tail {
            self.detach(t);
        }
        self.notify(id, NotifyKind::Change);
        true
    }

    // ---- scopes ----------------------------------------------------------

    /// The node whose scope governs `id`: nearest scope-carrying ancestor,
    /// falling back to the module root. A construct's scope only governs
    /// nodes reached through its body, never its own tokens.
    pub fn nearest_scope_owner(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        loop {
            let node = self.node(cur);
            match node.parent {
                None => return self.root,
                Some(parent) => {
                    if node.slot == Slot::Body && self.scope(parent).is_some() {
                        return parent;
                    }
                    cur = parent;
                }
            }
        }
    }

    pub fn scope(&self, id: NodeId) -> Option<&Scope> {
        match &self.node(id).kind {
            NodeKind::Module { scope, .. } => Some(scope),
            NodeKind::Construct(Construct { scope, .. }) => scope.as_ref(),
            _ => None,
        }
    }

    pub fn scope_mut(&mut self, id: NodeId) -> Option<&mut Scope> {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Module { scope, .. } => Some(scope),
            NodeKind::Construct(Construct { scope, .. }) => scope.as_mut(),
            _ => None,
        }
    }

    /// Nearest-scope identifier lookup through the owner chain.
    pub fn identifier_in_scope(&self, from: NodeId, name: &str) -> bool {
        let mut cur = from;
        loop {
            let owner = self.nearest_scope_owner(cur);
            if self.scope(owner).is_some_and(|s| s.contains(name)) {
                return true;
            }
            if owner == self.root {
                return false;
            }
            match self.node(owner).parent {
                Some(parent) => cur = parent,
                None => return false,
            }
        }
    }

    // ---- queries ---------------------------------------------------------

    /// The statement owning `line`: the one starting there, or the innermost
    /// statement whose span covers it. A statement can spill onto lines its
    /// body does not own when a token carries embedded newlines.
    pub fn statement_at_line(&self, line: usize) -> Option<NodeId> {
        fn search(tree: &Tree, body: &[NodeId], line: usize) -> Option<NodeId> {
            for stmt in body {
                let node = tree.node(*stmt);
                if node.left.line == line {
                    return Some(*stmt);
                }
                if node.left.line < line && line <= node.right.line {
                    if let Some(inner) = tree.body_of(*stmt) {
                        if let Some(found) = search(tree, inner, line) {
                            return Some(found);
                        }
                    }
                    return Some(*stmt);
                }
            }
            None
        }
        search(self, self.body_of(self.root)?, line)
    }

    /// All leaf tokens of a statement in document order, recursing through
    /// nested expressions and compounds but not into bodies.
    pub fn leaf_tokens(&self, stmt: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![stmt];
        while let Some(cur) = stack.pop() {
            match &self.node(cur).kind {
                NodeKind::Token(_) => out.push(cur),
                NodeKind::EmptyLine {
                    autocomplete: Some(tkn),
                } => out.push(*tkn),
                NodeKind::EmptyLine { autocomplete: None } => {}
                _ => {
                    for t in self.tokens_of(cur).iter().rev() {
                        stack.push(*t);
                    }
                }
            }
        }
        out
    }

    /// Whether a statement may be deleted outright: nothing the user typed
    /// survives in it. Any filled editable token, any sub-expression, or any
    /// non-blank body line keeps it alive.
    pub fn can_delete_statement(&self, stmt: NodeId) -> bool {
        for t in self.tokens_of(stmt) {
            match &self.node(*t).kind {
                NodeKind::Token(tkn) => {
                    if tkn.is_text_editable() && !tkn.text.is_empty() {
                        return false;
                    }
                }
                // A filled hole is a sub-expression; it blocks deletion.
                NodeKind::Construct(_) => return false,
                NodeKind::Compound(c) => {
                    if !c.tokens.is_empty() {
                        return false;
                    }
                }
                _ => {}
            }
        }
        if let Some(body) = self.body_of(stmt) {
            for line in body {
                if !self.node(*line).is_empty_line() {
                    return false;
                }
            }
        }
        true
    }

    // ---- rendering -------------------------------------------------------

    /// The full document text derived from the tree.
    pub fn render(&self) -> String {
        let body = self.body_of(self.root).unwrap_or(&[]);
        let mut lines = Vec::new();
        for stmt in body {
            lines.push(self.render_statement(*stmt, 0));
        }
        lines.join("\n")
    }

    fn render_statement(&self, stmt: NodeId, level: usize) -> String {
        let mut out = indent(level);
        out.push_str(&self.render_inline(stmt, level));
        if let Some(body) = self.body_of(stmt) {
            for line in body {
                out.push('\n');
                out.push_str(&self.render_statement(*line, level + 1));
            }
        }
        out
    }

    /// A node's single-line text (tokens only). Continuation lines of
    /// multi-line token text are re-indented to the owner's level.
    pub fn render_inline(&self, id: NodeId, level: usize) -> String {
        match &self.node(id).kind {
            NodeKind::Token(t) => t.render_text().replace('\n', &format!("\n{}", indent(level))),
            NodeKind::EmptyLine { autocomplete } => match autocomplete {
                Some(tkn) => self.render_inline(*tkn, level),
                None => String::new(),
            },
            NodeKind::Construct(_) | NodeKind::Compound(_) => self
                .tokens_of(id)
                .iter()
                .map(|t| self.render_inline(*t, level))
                .collect(),
            NodeKind::Module { .. } => String::new(),
        }
    }

    /// Text of a subtree as the external surface should receive it in a
    /// replacement edit: no leading indent on the first line, full indent on
    /// body continuation lines.
    pub fn render_subtree(&self, id: NodeId) -> String {
        let level = self.indent_level(id);
        let mut out = self.render_inline(id, level);
        if let Some(body) = self.body_of(id) {
            for line in body {
                out.push('\n');
                out.push_str(&self.render_statement(*line, level + 1));
            }
        }
        out
    }

    // ---- consistency -----------------------------------------------------

    /// Check the index invariant for every reachable node. Test support.
    pub fn check_index_consistency(&self) -> Result<(), String> {
        let mut stack = vec![self.root];
        while let Some(cur) = stack.pop() {
            for (slot, children) in [
                (Slot::Tokens, self.tokens_of(cur).to_vec()),
                (Slot::Body, self.body_of(cur).unwrap_or(&[]).to_vec()),
            ] {
                for (i, child) in children.iter().enumerate() {
                    let node = self.node(*child);
                    if node.parent != Some(cur) || node.index_in_parent != i || node.slot != slot {
                        return Err(format!(
                            "node {child:?}: parent {:?} (expected {cur:?}), \
                             index {} (expected {i}), slot {:?} (expected {slot:?})",
                            node.parent, node.index_in_parent, node.slot
                        ));
                    }
                    stack.push(*child);
                }
            }
        }
        Ok(())
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

fn token_for_format(fmt: &FormatToken) -> Option<Token> {
    match fmt {
        FormatToken::Literal { text } => Some(Token::literal(text.clone())),
        FormatToken::Hole { expected } => Some(Token::hole(*expected)),
        FormatToken::Identifier => Some(Token::identifier()),
        FormatToken::Assignment => Some(Token::assignment()),
        FormatToken::Editable { pattern, seed } => Some(Token::editable(pattern.clone(), seed.clone())),
        FormatToken::Reference => Some(Token::reference(String::new())),
        FormatToken::Body | FormatToken::Repeating { .. } => None,
    }
}
