//! Query builder rendering PostgREST query parameters.

/// Comparison operator of a row filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
    Ilike,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Gte => "gte",
            FilterOp::Lte => "lte",
            FilterOp::Ilike => "ilike",
        }
    }
}

/// Row filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn new(column: &str, op: FilterOp, value: impl ToString) -> Self {
        Self {
            column: column.to_string(),
            op,
            value: value.to_string(),
        }
    }

    pub fn eq(column: &str, value: impl ToString) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }

    /// Render as a `(column, "op.value")` query pair.
    pub fn to_param(&self) -> (String, String) {
        let value = match self.op {
            // PostgREST uses `*` as the LIKE wildcard in URLs.
            FilterOp::Ilike => self.value.replace('%', "*"),
            _ => self.value.clone(),
        };
        (self.column.clone(), format!("{}.{}", self.op.as_str(), value))
    }
}

/// Sort order of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A read against one named resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    resource: String,
    columns: String,
    filters: Vec<Filter>,
    order: Option<Order>,
    limit: Option<usize>,
}

impl Query {
    pub fn from(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::new(column, FilterOp::Eq, value))
    }

    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::new(column, FilterOp::Gte, value))
    }

    pub fn lte(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::new(column, FilterOp::Lte, value))
    }

    pub fn ilike(self, column: &str, pattern: impl ToString) -> Self {
        self.filter(Filter::new(column, FilterOp::Ilike, pattern))
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn order_by(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Render the full parameter list for a GET on the resource.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.filters.iter().map(Filter::to_param));
        if let Some(order) = &self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}
