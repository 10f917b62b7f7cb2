//! Symbol table and expression evaluator.
//!
//! Three symbol kinds share the table: global labels, constants, and macros.
//! Local labels (prefixed `@`) live in a separate list; each definition gets
//! a globally unique integer so repeated names never collide in the emitted
//! debug index. A local reference resolves within its scope to the latest
//! definition at or before the referring line.

use indexmap::IndexMap;

use crate::err::{Error, Origin, Result, Warning};
use crate::lex;
use crate::read::SourceLine;

/// Scope identifier.
///
/// Derived from a directive counter that increments at file boundaries and
/// at every `.org`/macro boundary, so it uniquely names one `(file, region)`
/// pair. Labels with equal names but different scopes are independent.
pub type Scope = u32;

/// A defined global label.
#[derive(Clone, Debug)]
pub struct Label {
    /// Assigned address.
    pub addr: u16,
    /// Definition site.
    pub origin: Origin,
}

/// A defined constant.
#[derive(Clone, Debug)]
pub struct Constant {
    /// Eagerly evaluated value.
    pub value: u16,
    /// Definition site.
    pub origin: Origin,
}

/// A captured macro definition.
#[derive(Clone, Debug)]
pub struct Macro {
    /// Parameter names.
    pub params: Vec<String>,
    /// Body lines, stored verbatim (post-include, pre-expansion).
    pub body: Vec<SourceLine>,
    /// Definition site (the `.macro` line).
    pub origin: Origin,
}

/// A defined local label.
#[derive(Clone, Debug)]
pub struct Local {
    /// Name as written (with `@`, plus any expansion suffix).
    pub name: String,
    /// Scope the definition belongs to.
    pub scope: Scope,
    /// Index of the defining line in the expanded stream.
    pub line: usize,
    /// Assigned address.
    pub addr: u16,
    /// Globally unique definition id.
    pub uniq: u32,
    /// Definition site.
    pub origin: Origin,
}

impl Local {
    /// Name under which this definition appears in the debug index.
    #[must_use]
    pub fn index_name(&self) -> String {
        format!("{}.{}", self.name.trim_start_matches('@'), self.uniq)
    }
}

/// Reference context for local-label resolution.
#[derive(Clone, Copy, Debug)]
pub struct Ctx {
    /// Scope of the referring line.
    pub scope: Scope,
    /// Index of the referring line in the expanded stream.
    pub line: usize,
}

/// The symbol table.
#[derive(Debug, Default)]
pub struct Symbols {
    /// Global labels by name.
    pub labels: IndexMap<String, Label>,
    /// Constants by name.
    pub consts: IndexMap<String, Constant>,
    /// Macros by name.
    pub macros: IndexMap<String, Macro>,
    /// Local label definitions, in definition order.
    pub locals: Vec<Local>,
    uniq: u32,
}

impl Symbols {
    /// Constructs an empty `Symbols`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a global label.
    ///
    /// # Errors
    ///
    /// Errors with [`Error::DuplicateLabel`] when the name already exists,
    /// naming the prior definition's line.
    pub fn define_label(&mut self, name: &str, addr: u16, origin: Origin) -> Result<()> {
        if let Some(prior) = self.labels.get(name) {
            return Err(Error::DuplicateLabel {
                name: name.to_string(),
                prior: prior.origin.line,
            });
        }
        self.labels.insert(name.to_string(), Label { addr, origin });
        Ok(())
    }

    /// Defines a local label, assigning it a fresh unique id.
    pub fn define_local(&mut self, name: &str, scope: Scope, line: usize, origin: Origin) -> u32 {
        let uniq = self.uniq;
        self.uniq += 1;
        self.locals.push(Local {
            name: name.to_string(),
            scope,
            line,
            addr: 0,
            uniq,
            origin,
        });
        uniq
    }

    /// Stores the address of a local definition (pass-1 backfill).
    pub fn place_local(&mut self, uniq: u32, addr: u16) {
        if let Some(local) = self.locals.iter_mut().find(|l| l.uniq == uniq) {
            local.addr = addr;
        }
    }

    /// Defines a constant, evaluated eagerly.
    ///
    /// # Errors
    ///
    /// Errors when the right-hand side references an undefined symbol;
    /// forward references to symbolic constants are not supported.
    pub fn define_const(&mut self, name: &str, expr: &str, origin: Origin) -> Result<Warnings> {
        let raw = self.eval(expr, None)?;
        let (value, warning) = narrow(raw, 16);
        self.consts.insert(
            name.to_string(),
            Constant {
                value,
                origin,
            },
        );
        Ok(warning)
    }

    /// Registers a macro definition.
    pub fn define_macro(&mut self, name: &str, def: Macro) {
        self.macros.insert(name.to_string(), def);
    }

    /// Resolves a local reference per the scope rule.
    ///
    /// Within the same scope, the latest definition at or before the
    /// referring line wins; with only later definitions, the earliest one is
    /// taken (forward reference). A name absent from the scope entirely is
    /// an [`Error::InvalidLocalScope`].
    pub fn resolve_local(&self, name: &str, ctx: Ctx) -> Result<&Local> {
        let in_scope = || {
            self.locals
                .iter()
                .filter(|l| l.scope == ctx.scope && l.name == name)
        };
        in_scope()
            .filter(|l| l.line <= ctx.line)
            .max_by_key(|l| l.line)
            .or_else(|| in_scope().min_by_key(|l| l.line))
            .ok_or_else(|| Error::InvalidLocalScope(name.to_string()))
    }

    /// Evaluates an expression: a left-to-right chain of `+`/`-` over terms.
    ///
    /// Terms are numeric literals, constants, global labels, or (when `ctx`
    /// is given) local-label references. No precedence, no parentheses.
    ///
    /// # Errors
    ///
    /// Errors on unresolvable terms and malformed chains.
    pub fn eval(&self, expr: &str, ctx: Option<Ctx>) -> Result<i64> {
        let mut acc = 0i64;
        for (sign, term) in terms(expr)? {
            let value = i64::from(self.term(&term, ctx)?);
            acc = if sign == '-' { acc - value } else { acc + value };
        }
        Ok(acc)
    }

    fn term(&self, term: &str, ctx: Option<Ctx>) -> Result<u32> {
        if let Some(value) = lex::literal(term) {
            return Ok(value);
        }
        if term.starts_with('@') {
            let ctx = ctx.ok_or_else(|| Error::UndefinedSymbol(term.to_string()))?;
            return self.resolve_local(term, ctx).map(|l| u32::from(l.addr));
        }
        if let Some(c) = self.consts.get(term) {
            return Ok(u32::from(c.value));
        }
        if let Some(l) = self.labels.get(term) {
            return Ok(u32::from(l.addr));
        }
        Err(Error::UndefinedSymbol(term.to_string()))
    }
}

/// Warning slot produced by narrowing.
pub type Warnings = Option<Warning>;

/// Masks a value to the context's width, reporting truncation.
#[must_use]
pub fn narrow(value: i64, bits: u8) -> (u16, Warnings) {
    let mask = (1i64 << bits) - 1;
    let masked = (value & mask) as u16;
    let warning = (value < 0 || value > mask).then(|| Warning::Truncated {
        value: (value & 0xffff_ffff) as u32,
        bits,
    });
    (masked, warning)
}

/// Splits an expression into signed terms, respecting `'…'` literals.
fn terms(expr: &str) -> Result<Vec<(char, String)>> {
    let mut out = Vec::new();
    let mut term = String::new();
    let mut sign = '+';
    let mut quoted = false;
    for c in expr.chars() {
        match c {
            '\'' => {
                quoted = !quoted;
                term.push(c);
            }
            '+' | '-' if !quoted => {
                push_term(&mut out, sign, &mut term, expr)?;
                sign = c;
            }
            _ => term.push(c),
        }
    }
    push_term(&mut out, sign, &mut term, expr)?;
    if out.is_empty() {
        return Err(Error::BadOperand(format!("empty expression `{expr}`")));
    }
    Ok(out)
}

fn push_term(
    out: &mut Vec<(char, String)>,
    sign: char,
    term: &mut String,
    expr: &str,
) -> Result<()> {
    let text = term.trim();
    if text.is_empty() {
        // A leading sign applies to the first term; an empty term anywhere
        // else is a malformed chain.
        if !out.is_empty() {
            return Err(Error::BadOperand(format!("malformed expression `{expr}`")));
        }
    } else {
        out.push((sign, text.to_string()));
    }
    term.clear();
    Ok(())
}
