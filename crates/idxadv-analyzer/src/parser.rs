//! Structural SQL analysis
//!
//! The analyser builds a syntax tree with `sqlparser` and walks it with a
//! propagated context (where / join / order-by), collecting base tables,
//! aliases, referenced columns, per-column predicate roles and literal
//! constants bound to equality predicates. It never executes, optimises or
//! rewrites the statement.

use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, Ident, Join, JoinConstraint, JoinOperator,
    OrderByExpr, Query, Select, SetExpr, Statement, TableFactor, TableWithJoins,
    Value as AstValue,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use idxadv_core::{sql_fingerprint, AdvisorError, ParsedQuery, PredicateRole, Result};

/// Context a column reference appears in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Where,
    Join,
    OrderBy,
}

/// The SQL analyser
///
/// Parsing is deterministic: the same text always yields the same
/// `ParsedQuery`.
pub struct SqlAnalyser;

impl SqlAnalyser {
    /// Parse a statement into its structural summary.
    ///
    /// Statements the grammar accepts but the walker does not model (DDL,
    /// utility commands) yield an empty `ParsedQuery`; only genuine parse
    /// failures are errors.
    pub fn parse(sql: &str) -> Result<ParsedQuery> {
        let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).map_err(|e| {
            AdvisorError::UnparseableStatement {
                fingerprint: sql_fingerprint(sql),
                reason: e.to_string(),
            }
        })?;
        if statements.is_empty() {
            return Err(AdvisorError::UnparseableStatement {
                fingerprint: sql_fingerprint(sql),
                reason: "no statement found".to_string(),
            });
        }
        let mut extractor = Extractor::default();
        for statement in &statements {
            extractor.statement(statement);
        }
        let parsed = extractor.finish();
        tracing::debug!(
            tables = parsed.tables.len(),
            where_columns = parsed.where_columns.len(),
            "statement analysed"
        );
        Ok(parsed)
    }
}

#[derive(Default)]
struct Extractor {
    out: ParsedQuery,
}

impl Extractor {
    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Query(query) => self.query(query),
            Statement::Update {
                table,
                from,
                selection,
                ..
            } => {
                self.table_with_joins(table);
                if let Some(from) = from {
                    self.table_with_joins(from);
                }
                if let Some(selection) = selection {
                    self.expr(selection, Context::Where, None);
                }
            }
            _ => {}
        }
    }

    fn query(&mut self, query: &Query) {
        self.set_expr(&query.body);
        for order in &query.order_by {
            self.order_by(order);
        }
    }

    fn set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => self.select(select),
            SetExpr::Query(query) => self.query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.set_expr(left);
                self.set_expr(right);
            }
            _ => {}
        }
    }

    fn select(&mut self, select: &Select) {
        // FROM first so aliases exist before predicates resolve them.
        for table in &select.from {
            self.table_with_joins(table);
        }
        if let Some(selection) = &select.selection {
            self.expr(selection, Context::Where, None);
        }
    }

    fn table_with_joins(&mut self, table: &TableWithJoins) {
        self.table_factor(&table.relation);
        for join in &table.joins {
            self.join(join);
        }
    }

    fn table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let Some(table) = name.0.last().map(|ident| ident.value.clone()) else {
                    return;
                };
                self.out.push_table(&table);
                match alias {
                    Some(alias) => {
                        self.out.aliases.insert(alias.name.value.clone(), table);
                    }
                    None => {
                        self.out.aliases.insert(table.clone(), table);
                    }
                }
            }
            TableFactor::Derived { subquery, .. } => self.query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins),
            _ => {}
        }
    }

    fn join(&mut self, join: &Join) {
        self.table_factor(&join.relation);
        let constraint = match &join.join_operator {
            JoinOperator::Inner(c)
            | JoinOperator::LeftOuter(c)
            | JoinOperator::RightOuter(c)
            | JoinOperator::FullOuter(c) => Some(c),
            _ => None,
        };
        match constraint {
            Some(JoinConstraint::On(expr)) => self.expr(expr, Context::Join, None),
            Some(JoinConstraint::Using(columns)) => {
                for ident in columns {
                    self.column(std::slice::from_ref(ident), Context::Join, None);
                }
            }
            _ => {}
        }
    }

    fn order_by(&mut self, order: &OrderByExpr) {
        self.expr(&order.expr, Context::OrderBy, None);
    }

    fn expr(&mut self, expr: &Expr, ctx: Context, role: Option<PredicateRole>) {
        match expr {
            Expr::Identifier(ident) => self.column(std::slice::from_ref(ident), ctx, role),
            Expr::CompoundIdentifier(parts) => self.column(parts, ctx, role),
            Expr::BinaryOp { left, op, right } => self.binary_op(left, op, right, ctx),
            Expr::Between {
                expr, low, high, ..
            } => {
                self.expr(expr, ctx, Some(PredicateRole::Range));
                self.expr(low, ctx, Some(PredicateRole::Range));
                self.expr(high, ctx, Some(PredicateRole::Range));
            }
            Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
                self.expr(expr, ctx, Some(PredicateRole::Other));
                self.expr(pattern, ctx, Some(PredicateRole::Other));
            }
            Expr::InList { expr, list, .. } => {
                self.expr(expr, ctx, Some(PredicateRole::Other));
                for item in list {
                    self.expr(item, ctx, Some(PredicateRole::Other));
                }
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.expr(expr, ctx, Some(PredicateRole::Other));
                self.query(subquery);
            }
            Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
                self.expr(inner, ctx, Some(PredicateRole::Other));
            }
            Expr::Nested(inner) => self.expr(inner, ctx, role),
            Expr::UnaryOp { expr: inner, .. } => self.expr(inner, ctx, role),
            Expr::Cast { expr: inner, .. } => self.expr(inner, ctx, role),
            Expr::Function(function) => {
                for arg in &function.args {
                    let arg_expr = match arg {
                        FunctionArg::Named { arg, .. } => arg,
                        FunctionArg::Unnamed(arg) => arg,
                    };
                    if let FunctionArgExpr::Expr(inner) = arg_expr {
                        self.expr(inner, ctx, role);
                    }
                }
            }
            Expr::Subquery(query) => self.query(query),
            Expr::Exists { subquery, .. } => self.query(subquery),
            _ => {}
        }
    }

    fn binary_op(&mut self, left: &Expr, op: &BinaryOperator, right: &Expr, ctx: Context) {
        match op {
            BinaryOperator::And | BinaryOperator::Or => {
                self.expr(left, ctx, None);
                self.expr(right, ctx, None);
            }
            BinaryOperator::Eq => {
                self.record_constant(left, right);
                self.expr(left, ctx, Some(PredicateRole::Equality));
                self.expr(right, ctx, Some(PredicateRole::Equality));
            }
            BinaryOperator::Lt | BinaryOperator::Gt | BinaryOperator::LtEq | BinaryOperator::GtEq => {
                self.expr(left, ctx, Some(PredicateRole::Range));
                self.expr(right, ctx, Some(PredicateRole::Range));
            }
            _ => {
                self.expr(left, ctx, Some(PredicateRole::Other));
                self.expr(right, ctx, Some(PredicateRole::Other));
            }
        }
    }

    /// Remember `column = literal` pairs for partial-index extraction.
    fn record_constant(&mut self, left: &Expr, right: &Expr) {
        if let (Some(column), Some(literal)) = (column_name(left), literal_text(right)) {
            self.out.constants.insert(column, literal);
        } else if let (Some(column), Some(literal)) = (column_name(right), literal_text(left)) {
            self.out.constants.insert(column, literal);
        }
    }

    fn column(&mut self, parts: &[Ident], ctx: Context, role: Option<PredicateRole>) {
        let Some(column) = parts.last().map(|ident| ident.value.clone()) else {
            return;
        };
        let qualifier = (parts.len() >= 2).then(|| parts[parts.len() - 2].value.clone());

        match ctx {
            Context::Where => {
                self.out.where_columns.insert(column.clone());
                self.insert_role(&column, role.unwrap_or(PredicateRole::Other));
            }
            Context::Join => {
                self.out.join_columns.insert(column.clone());
                if let Some(role) = role {
                    self.insert_role(&column, role);
                }
            }
            Context::OrderBy => {
                self.out.order_by_columns.insert(column.clone());
            }
        }

        if let Some(qualifier) = qualifier {
            let table = self.resolve_alias(&qualifier);
            self.out.column_tables.insert(column, table);
        }
    }

    /// Classification is upgrade-only: equality > range > other.
    fn insert_role(&mut self, column: &str, role: PredicateRole) {
        match self.out.roles.get(column) {
            Some(existing) if existing.priority() >= role.priority() => {}
            _ => {
                self.out.roles.insert(column.to_string(), role);
            }
        }
    }

    /// Alias maps are non-recursive; resolution is a single lookup.
    fn resolve_alias(&self, qualifier: &str) -> String {
        self.out
            .aliases
            .get(qualifier)
            .cloned()
            .unwrap_or_else(|| qualifier.to_string())
    }

    /// Resolve unqualified columns, or tag them ambiguous.
    fn finish(mut self) -> ParsedQuery {
        let single_table = (self.out.tables.len() == 1).then(|| self.out.tables[0].clone());
        let referenced: Vec<String> = self
            .out
            .where_columns
            .iter()
            .chain(self.out.join_columns.iter())
            .chain(self.out.order_by_columns.iter())
            .cloned()
            .collect();
        for column in referenced {
            if self.out.column_tables.contains_key(&column) {
                continue;
            }
            match &single_table {
                Some(table) => {
                    self.out.column_tables.insert(column, table.clone());
                }
                None => {
                    self.out.ambiguous.insert(column);
                }
            }
        }
        self.out
    }
}

fn column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|ident| ident.value.clone()),
        _ => None,
    }
}

/// Render a literal operand the way it would appear in a filter predicate.
fn literal_text(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Value(AstValue::SingleQuotedString(s)) => {
            Some(format!("'{}'", s.replace('\'', "''")))
        }
        Expr::Value(AstValue::Number(n, _)) => Some(n.clone()),
        Expr::Value(AstValue::Boolean(b)) => Some(b.to_string()),
        _ => None,
    }
}
