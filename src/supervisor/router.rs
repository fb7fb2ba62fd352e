// Path router: absolute guest path -> backend decision.
//
// The rule table is a const tree of (prefix, node) pairs, so a bad rule is a
// compile error, not a runtime surprise. Routing is a pure function of the
// normalized path.

/// Backend decision for one absolute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Blocked,
    Passthrough,
    Cow,
    Tmp,
    Proc,
}

enum Node {
    Leaf(Route),
    Branch {
        rules: &'static [(&'static str, Node)],
        default: Route,
    },
}

static ROUTE_RULES: Node = Node::Branch {
    rules: &[
        ("/sys", Node::Leaf(Route::Blocked)),
        ("/run", Node::Leaf(Route::Blocked)),
        (
            "/dev",
            Node::Branch {
                rules: &[
                    ("/dev/null", Node::Leaf(Route::Passthrough)),
                    ("/dev/zero", Node::Leaf(Route::Passthrough)),
                    ("/dev/random", Node::Leaf(Route::Passthrough)),
                    ("/dev/urandom", Node::Leaf(Route::Passthrough)),
                ],
                default: Route::Blocked,
            },
        ),
        ("/proc", Node::Leaf(Route::Proc)),
        (
            "/tmp",
            Node::Branch {
                // the overlay storage area itself must be invisible to guests
                rules: &[("/tmp/.bvisor", Node::Leaf(Route::Blocked))],
                default: Route::Tmp,
            },
        ),
    ],
    default: Route::Cow,
};

/// Lexically resolve `.` and `..` components. The result is absolute; `..`
/// above the root stays at the root, so a path that tries to escape `/tmp`
/// re-routes through the top-level rules.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for p in parts {
        out.push('/');
        out.push_str(p);
    }
    out
}

/// Route an absolute path to a backend decision.
pub fn route(path: &str) -> Route {
    let norm = normalize(path);
    walk(&ROUTE_RULES, &norm)
}

fn walk(node: &Node, path: &str) -> Route {
    match node {
        Node::Leaf(r) => *r,
        Node::Branch { rules, default } => {
            for (prefix, sub) in rules.iter() {
                if prefix_matches(prefix, path) {
                    return walk(sub, path);
                }
            }
            *default
        }
    }
}

// Exact match, or the next character after the prefix is '/'
// (so "/tmpfoo" does not match "/tmp").
fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.as_bytes()[0] == b'/',
        None => false,
    }
}
