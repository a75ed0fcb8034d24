//! SQL 분류기
//!
//! SQL 텍스트를 [`SqlAttribute`]로 변환합니다. 구조 분석은 `sqlparser`에 위임합니다.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use sqlparser::ast::{
    Expr, ObjectName, Query, Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use super::attribute::{SqlAttribute, SqlType, Table, TableRole};
use super::hint::SqlHint;
use crate::routing::{FailBehavior, SqlDialect, SqlParsingConfig};
use crate::routing::{RouteError, RouteResult};

// ============================================================================
// SqlClassifier - SQL 분류기
// ============================================================================

/// SQL 분류기
///
/// 공유 가변 상태가 없으므로 여러 스레드에서 동시에 사용할 수 있습니다.
#[derive(Debug, Clone, Default)]
pub struct SqlClassifier {
    /// 파싱 설정
    config: SqlParsingConfig,
}

impl SqlClassifier {
    /// 새 분류기 생성
    pub fn new(config: SqlParsingConfig) -> Self {
        Self { config }
    }

    /// 파싱 설정
    pub fn config(&self) -> &SqlParsingConfig {
        &self.config
    }

    /// SQL 분류
    ///
    /// 공백 SQL이면 `Ok(None)`을 반환합니다.
    pub fn classify(&self, raw_sql: &str) -> RouteResult<Option<SqlAttribute>> {
        let sql = normalize(raw_sql);
        if sql.is_empty() {
            return Ok(None);
        }

        let hint = match SqlHint::parse(&sql) {
            Ok(hint) => hint,
            Err(e) => return self.on_failure(&sql, &sql, None, e).map(Some),
        };
        let native_sql = hint
            .as_ref()
            .map(|h| h.native_sql().to_string())
            .unwrap_or_else(|| sql.clone());

        match self.analyze(&native_sql) {
            Ok(analysis) => {
                let read = self.config.read_kinds.contains(&analysis.sql_type) && !analysis.writes;
                Ok(Some(SqlAttribute {
                    sql,
                    native_sql,
                    sql_type: analysis.sql_type,
                    write: !read,
                    read,
                    tables: analysis.tables,
                    databases: analysis.databases,
                    hint,
                    fallback: false,
                }))
            }
            Err(message) => {
                let err = RouteError::parse(sql.clone(), message);
                self.on_failure(&sql, &native_sql, hint, err).map(Some)
            }
        }
    }

    /// 실패 처리 정책 적용
    fn on_failure(
        &self,
        sql: &str,
        native_sql: &str,
        hint: Option<SqlHint>,
        err: RouteError,
    ) -> RouteResult<SqlAttribute> {
        match self.config.fail_behavior {
            FailBehavior::Ignore => Ok(SqlAttribute::fallback(sql, native_sql, hint)),
            FailBehavior::Warning => {
                tracing::warn!(sql = %sql, error = %err, "sql parse error, routing to a write node");
                Ok(SqlAttribute::fallback(sql, native_sql, hint))
            }
            FailBehavior::Failing => Err(err),
        }
    }

    /// 구조 분석
    fn analyze(&self, sql: &str) -> Result<Analysis, String> {
        let dialect: Box<dyn Dialect> = match self.config.dialect {
            SqlDialect::Generic => Box::new(GenericDialect {}),
            SqlDialect::MySql => Box::new(MySqlDialect {}),
            SqlDialect::PostgreSql => Box::new(PostgreSqlDialect {}),
        };

        let statements = Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| e.to_string())?;
        let first = statements
            .first()
            .ok_or_else(|| "no statement found".to_string())?;

        let mut collector = TableCollector::default();
        let sql_type = collector.visit_statement(first);
        let mut writes = false;
        for statement in statements.iter().skip(1) {
            let kind = collector.visit_statement(statement);
            if !self.config.read_kinds.contains(&kind) {
                writes = true;
            }
        }

        Ok(Analysis {
            sql_type,
            writes,
            tables: collector.tables,
            databases: collector.databases,
        })
    }
}

/// 줄바꿈을 공백으로 바꾸고 앞뒤 공백 제거
fn normalize(sql: &str) -> String {
    sql.replace(['\r', '\n'], " ").trim().to_string()
}

/// 구조 분석 결과
struct Analysis {
    sql_type: SqlType,
    /// 첫 문장 이후에 쓰기 문장이 있는지
    writes: bool,
    tables: BTreeMap<TableRole, BTreeSet<Table>>,
    databases: BTreeSet<String>,
}

// ============================================================================
// TableCollector - AST 순회
// ============================================================================

#[derive(Default)]
struct TableCollector {
    tables: BTreeMap<TableRole, BTreeSet<Table>>,
    databases: BTreeSet<String>,
    /// WITH 절에서 정의된 이름 (테이블이 아님)
    ctes: HashSet<String>,
}

impl TableCollector {
    fn visit_statement(&mut self, statement: &Statement) -> SqlType {
        match statement {
            Statement::Query(query) => {
                self.visit_query(query, false);
                SqlType::Select
            }
            Statement::Insert {
                table_name, source, ..
            } => {
                self.add(table_name, TableRole::Insert);
                self.visit_query(source, true);
                SqlType::Insert
            }
            Statement::Update {
                table,
                from,
                selection,
                ..
            } => {
                self.visit_table_with_joins(table, TableRole::Update, TableRole::Join);
                if let Some(from) = from {
                    self.visit_table_with_joins(from, TableRole::From, TableRole::Join);
                }
                if let Some(selection) = selection {
                    self.visit_expr(selection);
                }
                SqlType::Update
            }
            Statement::Delete {
                from,
                using,
                selection,
                ..
            } => {
                for table in from {
                    self.visit_table_with_joins(table, TableRole::Delete, TableRole::Join);
                }
                for table in using.iter().flatten() {
                    self.visit_table_with_joins(table, TableRole::From, TableRole::Join);
                }
                if let Some(selection) = selection {
                    self.visit_expr(selection);
                }
                SqlType::Delete
            }
            Statement::Explain { .. } => SqlType::Explain,
            Statement::ExplainTable { table_name, .. } => {
                self.add(table_name, TableRole::From);
                SqlType::Explain
            }
            Statement::ShowTables { .. }
            | Statement::ShowColumns { .. }
            | Statement::ShowCreate { .. }
            | Statement::ShowVariable { .. }
            | Statement::ShowVariables { .. }
            | Statement::ShowFunctions { .. }
            | Statement::ShowCollation { .. } => SqlType::Show,
            _ => SqlType::Other,
        }
    }

    fn visit_query(&mut self, query: &Query, nested: bool) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
                self.visit_query(&cte.query, true);
            }
        }
        self.visit_set_expr(&query.body, nested);
    }

    fn visit_set_expr(&mut self, body: &SetExpr, nested: bool) {
        match body {
            SetExpr::Select(select) => self.visit_select(select, nested),
            SetExpr::Query(query) => self.visit_query(query, nested),
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left, nested);
                self.visit_set_expr(right, nested);
            }
            _ => {}
        }
    }

    fn visit_select(&mut self, select: &Select, nested: bool) {
        let (relation_role, join_role) = if nested {
            (TableRole::SubSelect, TableRole::SubSelect)
        } else {
            (TableRole::From, TableRole::Join)
        };

        for table in &select.from {
            self.visit_table_with_joins(table, relation_role, join_role);
        }

        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    self.visit_expr(expr)
                }
                _ => {}
            }
        }

        if let Some(selection) = &select.selection {
            self.visit_expr(selection);
        }
        if let Some(having) = &select.having {
            self.visit_expr(having);
        }
    }

    fn visit_table_with_joins(
        &mut self,
        table: &TableWithJoins,
        relation_role: TableRole,
        join_role: TableRole,
    ) {
        self.visit_factor(&table.relation, relation_role);
        for join in &table.joins {
            self.visit_factor(&join.relation, join_role);
        }
    }

    fn visit_factor(&mut self, factor: &TableFactor, role: TableRole) {
        match factor {
            TableFactor::Table { name, .. } => self.add(name, role),
            TableFactor::Derived { subquery, .. } => self.visit_query(subquery, true),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.visit_table_with_joins(table_with_joins, role, role),
            _ => {}
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Subquery(query) => self.visit_query(query, true),
            Expr::Exists { subquery, .. } => self.visit_query(subquery, true),
            Expr::InSubquery { expr, subquery, .. } => {
                self.visit_expr(expr);
                self.visit_query(subquery, true);
            }
            Expr::BinaryOp { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            Expr::UnaryOp { expr, .. } => self.visit_expr(expr),
            Expr::Nested(expr) | Expr::IsNull(expr) | Expr::IsNotNull(expr) => self.visit_expr(expr),
            Expr::Between {
                expr, low, high, ..
            } => {
                self.visit_expr(expr);
                self.visit_expr(low);
                self.visit_expr(high);
            }
            Expr::InList { expr, list, .. } => {
                self.visit_expr(expr);
                for item in list {
                    self.visit_expr(item);
                }
            }
            _ => {}
        }
    }

    fn add(&mut self, name: &ObjectName, role: TableRole) {
        let parts: Vec<&str> = name.0.iter().map(|ident| ident.value.as_str()).collect();
        let Some((table, qualifiers)) = parts.split_last() else {
            return;
        };
        let database = qualifiers.last().map(|db| db.to_string());

        if database.is_none() && self.ctes.contains(&table.to_lowercase()) {
            return;
        }
        if let Some(db) = &database {
            self.databases.insert(db.clone());
        }
        self.tables
            .entry(role)
            .or_default()
            .insert(Table::new(database, *table));
    }
}
