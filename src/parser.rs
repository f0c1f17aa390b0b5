//! Builds a [`QueryPlan`] from a token tree.
//!
//! A statement is cut into clause segments at the top level. Each segment is
//! parsed on its own into a fresh [`ParserState`]. Sub-queries in FROM or
//! JOIN position are parsed recursively with their own state. They share the
//! counters that name unaliased CASE expressions and sub-query placeholders,
//! so generated names are unique across the whole statement.

use crate::error::SqlError;
use crate::expr::{BinaryOperator, Expr};
use crate::plan::{
    Alias, Case, CaseBranch, Clause, ClauseMap, ColumnRef, Computation, Join, Literal,
    NestedQuery, Operation, OrderByItem, Projection, QueryPlan, TableSource, SUBQUERY_PREFIX,
};
use crate::tokenizer::{tokenize, Keyword, Token, TokenKind};
use crate::value::Value;
use log::{debug, trace};
use std::collections::BTreeMap;

/// Tokenizes and parses one statement.
pub fn parse(sql: &str) -> Result<QueryPlan, SqlError> {
    let tokens = tokenize(sql)?;
    parse_tokens(&tokens)
}

/// Parses an already tokenized statement.
pub fn parse_tokens(tokens: &[Token]) -> Result<QueryPlan, SqlError> {
    let tokens = significant(tokens);
    Parser::default().parse_statement(&tokens)
}

#[derive(Debug, Default)]
struct Parser {
    case_count: usize,
    subquery_count: usize,
}

/// Everything accumulated while parsing one (sub-)query.
#[derive(Debug)]
struct ParserState {
    clause: Clause,
    select: Option<Projection>,
    from: Option<TableSource>,
    joins: Vec<Join>,
    selection: Option<Expr>,
    group_by: Vec<String>,
    order_by: Vec<OrderByItem>,
    into: Option<String>,
    aliases: Vec<Alias>,
    literals: Vec<Literal>,
    computations: ClauseMap<Computation>,
    functions: BTreeMap<String, Vec<String>>,
    nested_queries: Vec<NestedQuery>,
}

impl ParserState {
    fn new() -> Self {
        Self {
            clause: Clause::Select,
            select: None,
            from: None,
            joins: Vec::new(),
            selection: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            into: None,
            aliases: Vec::new(),
            literals: Vec::new(),
            computations: ClauseMap::default(),
            functions: BTreeMap::new(),
            nested_queries: Vec::new(),
        }
    }

    fn is_claimed(&self, name: &str) -> bool {
        self.aliases.iter().any(|alias| alias.name == name)
            || self.literals.iter().any(|literal| literal.name == name)
            || self.computations.iter().any(|c| c.target() == name)
    }

    fn claim_name(&self, name: &str) -> Result<(), SqlError> {
        if self.is_claimed(name) {
            return Err(SqlError::parse(format!(
                "duplicate alias or column name: {}",
                name
            )));
        }
        Ok(())
    }

    fn add_bare_alias(&mut self, name: &str) {
        if !self.is_claimed(name) {
            self.aliases.push(Alias {
                name: name.to_string(),
                source: None,
            });
        }
    }

    fn add_literal(&mut self, name: &str, value: Value) {
        if !self.literals.iter().any(|literal| literal.name == name) {
            self.literals.push(Literal {
                name: name.to_string(),
                value,
            });
        }
    }

    fn add_computation(&mut self, computation: Computation) {
        trace!("{} computes {}", self.clause, computation.target());
        self.computations.push(self.clause, computation);
    }

    fn add_function(&mut self, column: &ColumnRef) {
        if let Some(function) = &column.function {
            let functions = self.functions.entry(column.name.clone()).or_default();
            if !functions.contains(function) {
                functions.push(function.clone());
            }
        }
    }

    fn into_plan(self) -> Result<QueryPlan, SqlError> {
        let select = self
            .select
            .ok_or_else(|| SqlError::parse("missing SELECT clause"))?;
        let from = self
            .from
            .ok_or_else(|| SqlError::parse("missing FROM clause"))?;
        Ok(QueryPlan {
            select,
            from,
            joins: self.joins,
            selection: self.selection,
            group_by: self.group_by,
            order_by: self.order_by,
            into: self.into,
            aliases: self.aliases,
            literals: self.literals,
            computations: self.computations,
            functions: self.functions,
            nested_queries: self.nested_queries,
        })
    }
}

impl Parser {
    fn parse_statement(&mut self, tokens: &[&Token]) -> Result<QueryPlan, SqlError> {
        let tokens = match tokens.split_last() {
            Some((last, rest)) if last.is_punctuation(";") => rest,
            _ => tokens,
        };
        match tokens.first() {
            Some(first) if first.is_keyword(Keyword::Select) => {}
            Some(first) => {
                return Err(SqlError::parse(format!(
                    "expected SELECT at start of statement, found '{}'",
                    first.text()
                )))
            }
            None => return Err(SqlError::parse("empty statement")),
        }

        let mut state = ParserState::new();
        for (clause, body) in segments(tokens)? {
            state.clause = clause;
            debug!("parsing {} clause ({} tokens)", clause, body.len());
            match clause {
                Clause::Select => self.parse_select(&mut state, &body)?,
                Clause::From => self.parse_from(&mut state, &body)?,
                Clause::Where => self.parse_where(&mut state, &body)?,
                Clause::GroupBy => self.parse_group_by(&mut state, &body)?,
                Clause::OrderBy => self.parse_order_by(&mut state, &body)?,
                Clause::Into => parse_into(&mut state, &body)?,
            }
        }
        discover_functions(&mut state, tokens.iter().copied())?;
        state.into_plan()
    }

    fn parse_select(&mut self, state: &mut ParserState, body: &[&Token]) -> Result<(), SqlError> {
        if let [token] = body {
            if token.kind() == TokenKind::Wildcard {
                state.select = Some(Projection::Wildcard);
                return Ok(());
            }
        }
        let mut columns = Vec::new();
        for item in split_commas(body)? {
            columns.push(self.resolve_identifier(state, &item)?);
        }
        if columns.is_empty() {
            return Err(SqlError::parse("SELECT requires at least one column"));
        }
        state.select = Some(Projection::Columns(columns));
        Ok(())
    }

    fn parse_from(&mut self, state: &mut ParserState, body: &[&Token]) -> Result<(), SqlError> {
        let (source, mut index) = self.parse_table_source(state, body, 0)?;
        state.from = Some(source);
        while let Some(token) = body.get(index) {
            let TokenKind::Keyword(Keyword::Join(kind)) = token.kind() else {
                return Err(SqlError::parse(format!(
                    "unexpected '{}' in FROM clause",
                    token.text()
                )));
            };
            let (source, next) = self.parse_table_source(state, body, index + 1)?;
            if !body.get(next).is_some_and(|t| t.is_keyword(Keyword::On)) {
                return Err(SqlError::parse(format!(
                    "expected ON after {} {}",
                    token.text(),
                    source.table
                )));
            }
            let condition = body
                .get(next + 1)
                .filter(|t| t.kind() == TokenKind::Comparison)
                .ok_or_else(|| SqlError::parse("expected a join condition after ON"))?;
            let (left_key, right_key) = join_keys(condition)?;
            state.joins.push(Join {
                table: source.table,
                alias: source.alias,
                kind,
                left_key,
                right_key,
            });
            index = next + 2;
        }
        Ok(())
    }

    /// Parses a table name or parenthesized sub-query at `index`, plus its
    /// optional alias. Returns the source and the index just past it.
    fn parse_table_source(
        &mut self,
        state: &mut ParserState,
        tokens: &[&Token],
        index: usize,
    ) -> Result<(TableSource, usize), SqlError> {
        let token = tokens
            .get(index)
            .ok_or_else(|| SqlError::parse("expected a table name"))?;
        match token.kind() {
            TokenKind::Parenthesis => {
                let inner = inner_tokens(token);
                if !inner.first().is_some_and(|t| t.is_keyword(Keyword::Select)) {
                    return Err(SqlError::parse(format!(
                        "expected a sub-query, found '{}'",
                        token.text()
                    )));
                }
                let plan = self.parse_statement(&inner)?;
                if plan.into.is_some() {
                    return Err(SqlError::parse("sub-queries cannot use INTO"));
                }
                let (alias, next) = table_alias(tokens, index + 1)?;
                let alias = alias.ok_or_else(|| SqlError::parse("sub-query requires an alias"))?;
                self.subquery_count += 1;
                let placeholder = format!("{}{}_{}", SUBQUERY_PREFIX, self.subquery_count, alias);
                debug!("registered sub-query {} as {}", alias, placeholder);
                state.nested_queries.push(NestedQuery {
                    placeholder: placeholder.clone(),
                    plan,
                });
                Ok((
                    TableSource {
                        table: placeholder,
                        alias,
                    },
                    next,
                ))
            }
            TokenKind::Identifier => {
                let table = identifier_name(token);
                let (alias, next) = table_alias(tokens, index + 1)?;
                Ok((
                    TableSource {
                        alias: alias.unwrap_or_else(|| table.clone()),
                        table,
                    },
                    next,
                ))
            }
            _ => Err(SqlError::parse(format!(
                "expected a table name, found '{}'",
                token.text()
            ))),
        }
    }

    fn parse_where(&mut self, state: &mut ParserState, body: &[&Token]) -> Result<(), SqlError> {
        state.selection = Some(self.parse_condition(state, body)?);
        Ok(())
    }

    fn parse_group_by(&mut self, state: &mut ParserState, body: &[&Token]) -> Result<(), SqlError> {
        for item in split_commas(body)? {
            let column = self.resolve_identifier(state, &item)?;
            if column.function.is_some() {
                return Err(SqlError::parse(format!("cannot GROUP BY aggregate {}", column)));
            }
            state.group_by.push(column.name);
        }
        if state.group_by.is_empty() {
            return Err(SqlError::parse("GROUP BY requires at least one column"));
        }
        Ok(())
    }

    fn parse_order_by(&mut self, state: &mut ParserState, body: &[&Token]) -> Result<(), SqlError> {
        for item in split_commas(body)? {
            let (descending, item) = match item.split_last() {
                Some((last, rest)) if last.is_keyword(Keyword::Desc) => (true, rest),
                Some((last, rest)) if last.is_keyword(Keyword::Asc) => (false, rest),
                _ => (false, item.as_slice()),
            };
            let column = self.resolve_identifier(state, item)?;
            state.order_by.push(OrderByItem { column, descending });
        }
        if state.order_by.is_empty() {
            return Err(SqlError::parse("ORDER BY requires at least one column"));
        }
        Ok(())
    }

    /// Resolves one item of a SELECT, GROUP BY or ORDER BY list to the
    /// column it will read, registering aliases, literals, CASE expressions
    /// and operations along the way.
    fn resolve_identifier(
        &mut self,
        state: &mut ParserState,
        tokens: &[&Token],
    ) -> Result<ColumnRef, SqlError> {
        if let Some(position) = tokens.iter().position(|t| t.is_keyword(Keyword::As)) {
            let name = match &tokens[position + 1..] {
                [token] if token.kind() == TokenKind::Identifier => identifier_name(token),
                _ => {
                    return Err(SqlError::parse(format!(
                        "expected a single name after AS in '{}'",
                        surface(tokens)
                    )))
                }
            };
            return self.resolve_aliased(state, &tokens[..position], name);
        }

        match tokens {
            [] => Err(SqlError::parse("expected a column")),
            [token] => match token.kind() {
                TokenKind::Literal => {
                    state.add_literal(token.text(), literal_value(token)?);
                    Ok(ColumnRef::new(token.text()))
                }
                TokenKind::Identifier => {
                    let name = identifier_name(token);
                    if state.clause == Clause::Select && !name.contains('.') {
                        state.add_bare_alias(&name);
                    }
                    Ok(ColumnRef::new(name))
                }
                TokenKind::Function => function_ref(token),
                TokenKind::Case => self.parse_case(state, token, None),
                TokenKind::Parenthesis => self.parse_operation(state, tokens, None),
                TokenKind::Wildcard => Err(SqlError::parse(
                    "'*' cannot be combined with other columns",
                )),
                _ => Err(unexpected(token)),
            },
            _ => match dotted_name(tokens) {
                Some(name) => Ok(ColumnRef::new(name)),
                None => self.parse_operation(state, tokens, None),
            },
        }
    }

    fn resolve_aliased(
        &mut self,
        state: &mut ParserState,
        expr: &[&Token],
        name: String,
    ) -> Result<ColumnRef, SqlError> {
        state.claim_name(&name)?;
        let source = match expr {
            [] => return Err(SqlError::parse(format!("missing expression before AS {}", name))),
            [token] => match token.kind() {
                TokenKind::Literal => {
                    state.add_literal(&name, literal_value(token)?);
                    return Ok(ColumnRef::new(name));
                }
                TokenKind::Identifier => ColumnRef::new(identifier_name(token)),
                TokenKind::Function => function_ref(token)?,
                TokenKind::Case => return self.parse_case(state, token, Some(name)),
                TokenKind::Parenthesis => return self.parse_operation(state, expr, Some(name)),
                _ => return Err(unexpected(token)),
            },
            _ => match dotted_name(expr) {
                Some(dotted) => ColumnRef::new(dotted),
                None => return self.parse_operation(state, expr, Some(name)),
            },
        };
        trace!("alias {} -> {}", name, source);
        state.aliases.push(Alias {
            name: name.clone(),
            source: Some(source),
        });
        Ok(ColumnRef::new(name))
    }

    fn parse_operation(
        &mut self,
        state: &mut ParserState,
        tokens: &[&Token],
        name: Option<String>,
    ) -> Result<ColumnRef, SqlError> {
        let expr = self.parse_arithmetic(state, tokens)?;
        if let (Expr::Column(column), None) = (&expr, &name) {
            return Ok(column.clone());
        }
        let target = name.unwrap_or_else(|| expr.to_string());
        let same = |c: &Computation| {
            matches!(c, Computation::Operation(op) if op.target == target && op.expr == expr)
        };
        if state.computations.iter().any(|c| c.target() == target && !same(c)) {
            return Err(SqlError::parse(format!(
                "duplicate alias or column name: {}",
                target
            )));
        }
        if !state.computations.get(state.clause).iter().any(same) {
            state.add_computation(Computation::Operation(Operation {
                target: target.clone(),
                expr,
            }));
        }
        Ok(ColumnRef::new(target))
    }

    /// Splits a run on arithmetic operators and folds the operands with the
    /// usual precedence: `* / %` before `+ -`, both left associative. A `-`
    /// with no operand before it negates the operand after it.
    fn parse_arithmetic(
        &mut self,
        state: &mut ParserState,
        tokens: &[&Token],
    ) -> Result<Expr, SqlError> {
        let mut operands = Vec::new();
        let mut operators = Vec::new();
        let mut run: Vec<&Token> = Vec::new();
        let mut negated = false;
        for &token in tokens {
            let operator = match token.kind() {
                TokenKind::Operator => BinaryOperator::from_arithmetic(token.text()),
                _ => None,
            };
            match operator {
                Some(BinaryOperator::Minus) if run.is_empty() => negated = !negated,
                Some(operator) => {
                    operands.push(self.parse_signed(state, &run, negated)?);
                    operators.push(operator);
                    run.clear();
                    negated = false;
                }
                None => run.push(token),
            }
        }
        operands.push(self.parse_signed(state, &run, negated)?);

        let mut operands = operands.into_iter();
        let Some(mut current) = operands.next() else {
            return Err(SqlError::parse("missing operand"));
        };
        let mut additive: Vec<(BinaryOperator, Expr)> = Vec::new();
        for (operator, operand) in operators.into_iter().zip(operands) {
            if operator.is_multiplicative() {
                current = Expr::binary(current, operator, operand);
            } else {
                additive.push((operator, std::mem::replace(&mut current, operand)));
            }
        }
        let mut terms = additive.into_iter();
        let Some((mut operator, mut expr)) = terms.next() else {
            return Ok(current);
        };
        for (next_operator, term) in terms {
            expr = Expr::binary(expr, operator, term);
            operator = next_operator;
        }
        Ok(Expr::binary(expr, operator, current))
    }

    fn parse_signed(
        &mut self,
        state: &mut ParserState,
        tokens: &[&Token],
        negated: bool,
    ) -> Result<Expr, SqlError> {
        let operand = self.parse_operand(state, tokens)?;
        Ok(if negated { Expr::negate(operand) } else { operand })
    }

    fn parse_operand(
        &mut self,
        state: &mut ParserState,
        tokens: &[&Token],
    ) -> Result<Expr, SqlError> {
        match tokens {
            [] => Err(SqlError::parse("missing operand in expression")),
            [token] => match token.kind() {
                TokenKind::Literal => Ok(Expr::Literal(literal_value(token)?)),
                TokenKind::Identifier => Ok(Expr::column(identifier_name(token))),
                TokenKind::Function => Ok(Expr::Column(function_ref(token)?)),
                TokenKind::Case => Ok(Expr::Column(self.parse_case(state, token, None)?)),
                TokenKind::Parenthesis => {
                    let inner = inner_tokens(token);
                    if inner.first().is_some_and(|t| t.is_keyword(Keyword::Select)) {
                        return Err(SqlError::parse(
                            "sub-queries are only supported in FROM and JOIN",
                        ));
                    }
                    self.parse_arithmetic(state, &inner)
                }
                _ => Err(unexpected(token)),
            },
            _ => dotted_name(tokens)
                .map(Expr::column)
                .ok_or_else(|| {
                    SqlError::parse(format!("cannot parse operand '{}'", surface(tokens)))
                }),
        }
    }

    /// Rebuilds a searched CASE by walking its body backwards from END: the
    /// run after each THEN or ELSE is the value, and the run after the
    /// preceding WHEN is the condition that governs it.
    fn parse_case(
        &mut self,
        state: &mut ParserState,
        token: &Token,
        name: Option<String>,
    ) -> Result<ColumnRef, SqlError> {
        let children = significant(token.children());
        let body = match children.as_slice() {
            [case, body @ .., end] if case.is_keyword(Keyword::Case) && end.is_keyword(Keyword::End) => {
                body
            }
            _ => return Err(SqlError::parse(format!("malformed CASE '{}'", token.text()))),
        };
        if !body.first().is_some_and(|t| t.is_keyword(Keyword::When)) {
            return Err(SqlError::parse("CASE must start with WHEN"));
        }

        let mut branches = Vec::new();
        let mut else_value = None;
        let mut pending_value: Option<Expr> = None;
        let mut end = body.len();
        for index in (0..body.len()).rev() {
            let keyword = match body[index].kind() {
                TokenKind::Keyword(keyword @ (Keyword::When | Keyword::Then | Keyword::Else)) => {
                    keyword
                }
                _ => continue,
            };
            let run = &body[index + 1..end];
            end = index;
            match keyword {
                Keyword::Else => {
                    if else_value.is_some() || pending_value.is_some() || !branches.is_empty() {
                        return Err(SqlError::parse("ELSE must come last in CASE"));
                    }
                    else_value = Some(self.parse_arithmetic(state, run)?);
                }
                Keyword::Then => {
                    if pending_value.is_some() {
                        return Err(SqlError::parse("THEN without a matching WHEN"));
                    }
                    pending_value = Some(self.parse_arithmetic(state, run)?);
                }
                _ => {
                    let value = pending_value
                        .take()
                        .ok_or_else(|| SqlError::parse("WHEN without a matching THEN"))?;
                    let condition = self.parse_condition(state, run)?;
                    branches.push(CaseBranch { condition, value });
                }
            }
        }
        if pending_value.is_some() {
            return Err(SqlError::parse("THEN without a matching WHEN"));
        }
        branches.reverse();

        let target = match name {
            Some(name) => name,
            None => {
                self.case_count += 1;
                let name = format!("case{}", self.case_count);
                state.claim_name(&name)?;
                name
            }
        };
        state.add_computation(Computation::Case(Case {
            target: target.clone(),
            branches,
            else_value,
        }));
        Ok(ColumnRef::new(target))
    }

    /// `comparison ((AND | OR) comparison)*` where AND binds tighter and a
    /// parenthesized condition groups.
    fn parse_condition(
        &mut self,
        state: &mut ParserState,
        tokens: &[&Token],
    ) -> Result<Expr, SqlError> {
        let mut disjuncts = Vec::new();
        for part in split_keyword(tokens, Keyword::Or) {
            let mut conjuncts = Vec::new();
            for atom in split_keyword(&part, Keyword::And) {
                conjuncts.push(self.parse_predicate(state, &atom)?);
            }
            disjuncts.push(fold(conjuncts, BinaryOperator::And)?);
        }
        fold(disjuncts, BinaryOperator::Or)
    }

    fn parse_predicate(
        &mut self,
        state: &mut ParserState,
        tokens: &[&Token],
    ) -> Result<Expr, SqlError> {
        match tokens {
            [token] if token.kind() == TokenKind::Comparison => {
                let parts = significant(token.children());
                let [left, op, right] = parts.as_slice() else {
                    return Err(SqlError::parse(format!(
                        "comparison '{}' must have exactly three tokens",
                        token.text()
                    )));
                };
                let op = BinaryOperator::from_comparison(op.text()).ok_or_else(|| unexpected(op))?;
                let left = self.parse_operand(state, &[*left])?;
                let right = self.parse_operand(state, &[*right])?;
                Ok(Expr::binary(left, op, right))
            }
            [token] if token.kind() == TokenKind::Parenthesis => {
                let inner = inner_tokens(token);
                if inner.first().is_some_and(|t| t.is_keyword(Keyword::Select)) {
                    return Err(SqlError::parse(
                        "sub-queries are only supported in FROM and JOIN",
                    ));
                }
                self.parse_condition(state, &inner)
            }
            [] => Err(SqlError::parse("missing condition")),
            _ => Err(SqlError::parse(format!(
                "expected a comparison, found '{}'",
                surface(tokens)
            ))),
        }
    }
}

fn parse_into(state: &mut ParserState, body: &[&Token]) -> Result<(), SqlError> {
    match body {
        [token] if token.kind() == TokenKind::Identifier => {
            state.into = Some(identifier_name(token));
            Ok(())
        }
        _ => Err(SqlError::parse("INTO expects a single table name")),
    }
}

/// Collects every aggregate call in the statement, wherever it appears.
/// Sub-queries own their aggregates and are skipped.
fn discover_functions<'a>(
    state: &mut ParserState,
    tokens: impl IntoIterator<Item = &'a Token>,
) -> Result<(), SqlError> {
    for token in tokens {
        match token.kind() {
            TokenKind::Function => state.add_function(&function_ref(token)?),
            TokenKind::Parenthesis
                if inner_tokens(token)
                    .first()
                    .is_some_and(|t| t.is_keyword(Keyword::Select)) => {}
            _ => discover_functions(state, token.children())?,
        }
    }
    Ok(())
}

/// Cuts the statement at clause keywords.
fn segments<'t>(tokens: &[&'t Token]) -> Result<Vec<(Clause, Vec<&'t Token>)>, SqlError> {
    let mut out: Vec<(Clause, Vec<&'t Token>)> = Vec::new();
    for &token in tokens {
        if let TokenKind::Keyword(keyword) = token.kind() {
            let clause = match keyword {
                Keyword::Select => Some(Clause::Select),
                Keyword::From => Some(Clause::From),
                Keyword::Where => Some(Clause::Where),
                Keyword::GroupBy => Some(Clause::GroupBy),
                Keyword::OrderBy => Some(Clause::OrderBy),
                Keyword::Into => Some(Clause::Into),
                Keyword::Reserved => {
                    return Err(SqlError::parse(format!(
                        "unsupported keyword {}",
                        token.text()
                    )))
                }
                _ => None,
            };
            if let Some(clause) = clause {
                if out.iter().any(|(seen, _)| *seen == clause) {
                    return Err(SqlError::parse(format!("duplicate {} clause", clause)));
                }
                out.push((clause, Vec::new()));
                continue;
            }
        }
        match out.last_mut() {
            Some((_, body)) => body.push(token),
            None => return Err(unexpected(token)),
        }
    }
    Ok(out)
}

fn significant(tokens: &[Token]) -> Vec<&Token> {
    tokens.iter().filter(|token| !token.is_trivia()).collect()
}

/// Significant tokens between a parenthesis pair.
fn inner_tokens(token: &Token) -> Vec<&Token> {
    let children = token.children();
    let inner = match children {
        [open, inner @ .., close] if open.is_punctuation("(") && close.is_punctuation(")") => inner,
        _ => children,
    };
    significant(inner)
}

fn split_commas<'t>(tokens: &[&'t Token]) -> Result<Vec<Vec<&'t Token>>, SqlError> {
    let mut items = vec![Vec::new()];
    for &token in tokens {
        if token.is_punctuation(",") {
            items.push(Vec::new());
        } else if let Some(item) = items.last_mut() {
            item.push(token);
        }
    }
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    if items.iter().any(Vec::is_empty) {
        return Err(SqlError::parse(format!(
            "empty item in list '{}'",
            surface(tokens)
        )));
    }
    Ok(items)
}

fn split_keyword<'t>(tokens: &[&'t Token], keyword: Keyword) -> Vec<Vec<&'t Token>> {
    let mut parts = vec![Vec::new()];
    for &token in tokens {
        if token.is_keyword(keyword) {
            parts.push(Vec::new());
        } else if let Some(part) = parts.last_mut() {
            part.push(token);
        }
    }
    parts
}

fn fold(mut exprs: Vec<Expr>, op: BinaryOperator) -> Result<Expr, SqlError> {
    if exprs.is_empty() {
        return Err(SqlError::parse("missing condition"));
    }
    let first = exprs.remove(0);
    Ok(exprs
        .into_iter()
        .fold(first, |left, right| Expr::binary(left, op, right)))
}

fn table_alias(tokens: &[&Token], index: usize) -> Result<(Option<String>, usize), SqlError> {
    let explicit = tokens.get(index).is_some_and(|t| t.is_keyword(Keyword::As));
    let index = if explicit { index + 1 } else { index };
    match tokens.get(index) {
        Some(token) if token.kind() == TokenKind::Identifier => {
            Ok((Some(identifier_name(token)), index + 1))
        }
        _ if explicit => Err(SqlError::parse("expected an alias after AS")),
        _ => Ok((None, index)),
    }
}

fn join_keys(condition: &Token) -> Result<(String, String), SqlError> {
    let parts = significant(condition.children());
    match parts.as_slice() {
        [left, op, right]
            if BinaryOperator::from_comparison(op.text()) == Some(BinaryOperator::Eq)
                && left.kind() == TokenKind::Identifier
                && right.kind() == TokenKind::Identifier =>
        {
            Ok((identifier_name(left), identifier_name(right)))
        }
        _ => Err(SqlError::parse(format!(
            "join condition must compare two columns for equality, found '{}'",
            condition.text()
        ))),
    }
}

/// Name of an identifier token, dotted groups joined without whitespace.
fn identifier_name(token: &Token) -> String {
    if token.is_group() {
        significant(token.children())
            .iter()
            .map(|t| t.text())
            .collect()
    } else {
        token.text().to_string()
    }
}

/// `name . name (. name)*` split across tokens, joined into one name.
fn dotted_name(tokens: &[&Token]) -> Option<String> {
    if tokens.len() < 3 || tokens.len() % 2 == 0 {
        return None;
    }
    let mut name = String::new();
    for (index, token) in tokens.iter().enumerate() {
        if index % 2 == 0 {
            if token.kind() != TokenKind::Identifier {
                return None;
            }
            name.push_str(&identifier_name(token));
        } else if token.is_punctuation(".") {
            name.push('.');
        } else {
            return None;
        }
    }
    Some(name)
}

fn function_ref(token: &Token) -> Result<ColumnRef, SqlError> {
    let parts = significant(token.children());
    let [name, args] = parts.as_slice() else {
        return Err(unexpected(token));
    };
    let args = inner_tokens(args);
    let column = match args.as_slice() {
        [arg] if arg.kind() == TokenKind::Identifier => identifier_name(arg),
        _ => dotted_name(&args).ok_or_else(|| {
            SqlError::parse(format!(
                "aggregate {} expects a single column argument",
                token.text()
            ))
        })?,
    };
    Ok(ColumnRef::aggregated(
        column,
        name.text().to_ascii_lowercase(),
    ))
}

fn literal_value(token: &Token) -> Result<Value, SqlError> {
    let text = token.text();
    if text.eq_ignore_ascii_case("NULL") {
        return Ok(Value::Null);
    }
    if let Some(quoted) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Ok(Value::Text(quoted.replace("''", "'")));
    }
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(value) = text.parse::<i64>() {
            return Ok(Value::Integer(value));
        }
    }
    text.parse::<f64>()
        .map(Value::Real)
        .map_err(|_| SqlError::parse(format!("invalid literal {}", text)))
}

fn surface(tokens: &[&Token]) -> String {
    tokens
        .iter()
        .map(|t| t.text())
        .collect::<Vec<_>>()
        .join(" ")
}

fn unexpected(token: &Token) -> SqlError {
    SqlError::parse(format!("unexpected '{}'", token.text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reports_missing_from() {
        let err = parse("SELECT t.a").unwrap_err();
        assert!(matches!(err, SqlError::Parse(message) if message.contains("FROM")));
    }

    #[test]
    fn parse_accepts_trailing_semicolon() {
        let plan = parse("SELECT t.a FROM t;").unwrap();
        assert_eq!(plan.from.alias, "t");
    }

    #[test]
    fn literal_values_are_typed() {
        let plan = parse("SELECT 1, 2.5, 'it''s', NULL FROM t").unwrap();
        let values: Vec<Value> = plan.literals.into_iter().map(|l| l.value).collect();
        assert_eq!(
            values,
            vec![
                Value::Integer(1),
                Value::Real(2.5),
                Value::Text("it's".into()),
                Value::Null
            ]
        );
    }
}
