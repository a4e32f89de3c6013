//! Database service for rent-billing-service.
//!
//! All invoice access is org-scoped: every query filters on `org_id`, and an
//! id that resolves in another org behaves exactly like a missing id.

use crate::models::{
    compute_totals, CreateInvoice, Invoice, InvoiceStatus, Lease, LeaseStatus, LineItem,
    ListInvoicesFilter, NewLineItem, TenantRecord, UpdateInvoice,
};
use crate::services::generation::PlannedInvoice;
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = "invoice_id, org_id, invoice_number, tenant_id, property_id, lease_id, created_by, \
     title, category, priority, status, subtotal, tax_amount, discount_amount, total_amount, \
     issue_date, due_date, sent_at, viewed_at, paid_at, \
     is_recurring, frequency, next_invoice_date, recurrence_end_date, \
     notes, payment_terms, attachments, created_utc, updated_utc";

const LINE_ITEM_COLUMNS: &str =
    "line_item_id, invoice_id, org_id, description, quantity, unit_price, tax_rate, amount, \
     sort_order, created_utc";

/// Outcome of inserting one generated invoice.
pub enum GeneratedInsert {
    Created(Invoice),
    /// The `(lease_id, due_date)` unique index fired: a concurrent run beat
    /// us to this lease/month pair. Not an error.
    DuplicateSkipped,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "rent-billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Create an invoice with its line items. Line amounts and totals are
    /// recomputed here; caller-supplied amounts are never stored.
    #[instrument(skip(self, input), fields(org_id = %input.org_id, tenant_id = %input.tenant_id))]
    pub async fn create_invoice(
        &self,
        input: &CreateInvoice,
        now: DateTime<Utc>,
    ) -> Result<(Invoice, Vec<LineItem>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let amounts: Vec<Decimal> = input.line_items.iter().map(|li| li.amount()).collect();
        let (subtotal, total_amount) =
            compute_totals(&amounts, input.tax_amount, input.discount_amount);

        // Sequence seed for the human-readable number; uniqueness comes from
        // the (org_id, invoice_number) constraint, not this count.
        let org_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE org_id = $1")
                .bind(input.org_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to count invoices: {}", e))
                })?;
        let invoice_number = crate::models::manual_invoice_number(now, org_count + 1);

        let status = InvoiceStatus::derived(InvoiceStatus::Draft, input.due_date, now.date_naive());

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice_id = Uuid::new_v4();
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (
                invoice_id, org_id, invoice_number, tenant_id, property_id, lease_id, created_by,
                title, category, priority, status, subtotal, tax_amount, discount_amount, total_amount,
                issue_date, due_date, is_recurring, frequency, next_invoice_date, recurrence_end_date,
                notes, payment_terms, attachments, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $25)
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(invoice_id)
        .bind(input.org_id)
        .bind(&invoice_number)
        .bind(input.tenant_id)
        .bind(input.property_id)
        .bind(input.lease_id)
        .bind(input.created_by)
        .bind(&input.title)
        .bind(input.category.as_str())
        .bind(input.priority.as_str())
        .bind(status.as_str())
        .bind(subtotal)
        .bind(input.tax_amount)
        .bind(input.discount_amount)
        .bind(total_amount)
        .bind(input.issue_date)
        .bind(input.due_date)
        .bind(input.is_recurring)
        .bind(input.frequency.map(|f| f.as_str()))
        .bind(input.next_invoice_date)
        .bind(input.recurrence_end_date)
        .bind(&input.notes)
        .bind(&input.payment_terms)
        .bind(sqlx::types::Json(&input.attachments))
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Duplicate(anyhow::anyhow!("Invoice number already exists"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        let mut line_items = Vec::with_capacity(input.line_items.len());
        for item in &input.line_items {
            line_items.push(insert_line_item(&mut tx, input.org_id, invoice_id, item, now).await?);
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit invoice: {}", e))
        })?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            "Invoice created"
        );

        Ok((invoice, line_items))
    }

    /// Get an invoice by ID.
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE org_id = $1 AND invoice_id = $2
            "#,
        ))
        .bind(org_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Get line items for an invoice.
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn get_line_items(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<LineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_line_items"])
            .start_timer();

        let line_items = sqlx::query_as::<_, LineItem>(&format!(
            r#"
            SELECT {LINE_ITEM_COLUMNS}
            FROM invoice_line_items
            WHERE org_id = $1 AND invoice_id = $2
            ORDER BY sort_order, created_utc
            "#,
        ))
        .bind(org_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get line items: {}", e)))?;

        timer.observe_duration();

        Ok(line_items)
    }

    /// List invoices for an org with keyset pagination.
    #[instrument(skip(self, filter), fields(org_id = %org_id))]
    pub async fn list_invoices(
        &self,
        org_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;
        let status_str = filter.status.map(|s| s.as_str().to_string());
        let category_str = filter.category.map(|c| c.as_str().to_string());

        let invoices = if let Some(cursor) = filter.page_token {
            sqlx::query_as::<_, Invoice>(&format!(
                r#"
                SELECT {INVOICE_COLUMNS}
                FROM invoices
                WHERE org_id = $1
                  AND ($2::varchar IS NULL OR status = $2)
                  AND ($3::varchar IS NULL OR category = $3)
                  AND ($4::uuid IS NULL OR tenant_id = $4)
                  AND ($5::uuid IS NULL OR lease_id = $5)
                  AND ($6::date IS NULL OR issue_date >= $6)
                  AND ($7::date IS NULL OR issue_date <= $7)
                  AND invoice_id > $8
                ORDER BY invoice_id
                LIMIT $9
                "#,
            ))
            .bind(org_id)
            .bind(&status_str)
            .bind(&category_str)
            .bind(filter.tenant_id)
            .bind(filter.lease_id)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Invoice>(&format!(
                r#"
                SELECT {INVOICE_COLUMNS}
                FROM invoices
                WHERE org_id = $1
                  AND ($2::varchar IS NULL OR status = $2)
                  AND ($3::varchar IS NULL OR category = $3)
                  AND ($4::uuid IS NULL OR tenant_id = $4)
                  AND ($5::uuid IS NULL OR lease_id = $5)
                  AND ($6::date IS NULL OR issue_date >= $6)
                  AND ($7::date IS NULL OR issue_date <= $7)
                ORDER BY invoice_id
                LIMIT $8
                "#,
            ))
            .bind(org_id)
            .bind(&status_str)
            .bind(&category_str)
            .bind(filter.tenant_id)
            .bind(filter.lease_id)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Update an invoice. Totals are recomputed unconditionally from the
    /// final line-item set; tenant/property changes re-check the reference.
    #[instrument(skip(self, input), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn update_invoice(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateInvoice,
        now: DateTime<Utc>,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let existing = match self.get_invoice(org_id, invoice_id).await? {
            Some(inv) => inv,
            None => return Ok(None),
        };
        if existing.status().is_terminal() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invoice in status '{}' can no longer be edited",
                existing.status
            )));
        }
        if input.due_date_conflicts(existing.issue_date) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Due date cannot be before issue date"
            )));
        }

        // Cross-entity check when the tenant or property reference moves.
        let tenant_id = input.tenant_id.unwrap_or(existing.tenant_id);
        let property_id = input.property_id.unwrap_or(existing.property_id);
        if tenant_id != existing.tenant_id || property_id != existing.property_id {
            self.verify_tenant_reference(org_id, tenant_id, property_id)
                .await?;
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query(
            r#"
            UPDATE invoices
            SET tenant_id = COALESCE($3, tenant_id),
                property_id = COALESCE($4, property_id),
                title = COALESCE($5, title),
                category = COALESCE($6, category),
                priority = COALESCE($7, priority),
                due_date = COALESCE($8, due_date),
                tax_amount = COALESCE($9, tax_amount),
                discount_amount = COALESCE($10, discount_amount),
                notes = COALESCE($11, notes),
                payment_terms = COALESCE($12, payment_terms)
            WHERE org_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(org_id)
        .bind(invoice_id)
        .bind(input.tenant_id)
        .bind(input.property_id)
        .bind(&input.title)
        .bind(input.category.map(|c| c.as_str()))
        .bind(input.priority.map(|p| p.as_str()))
        .bind(input.due_date)
        .bind(input.tax_amount)
        .bind(input.discount_amount)
        .bind(&input.notes)
        .bind(&input.payment_terms)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        if let Some(items) = &input.line_items {
            sqlx::query("DELETE FROM invoice_line_items WHERE org_id = $1 AND invoice_id = $2")
                .bind(org_id)
                .bind(invoice_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to replace line items: {}", e))
                })?;
            for item in items {
                insert_line_item(&mut tx, org_id, invoice_id, item, now).await?;
            }
        }

        // Unconditional recompute from whatever line items now exist.
        let amounts: Vec<Decimal> = sqlx::query_scalar(
            "SELECT amount FROM invoice_line_items WHERE org_id = $1 AND invoice_id = $2",
        )
        .bind(org_id)
        .bind(invoice_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load line amounts: {}", e))
        })?;

        let tax = input.tax_amount.unwrap_or(existing.tax_amount);
        let discount = input.discount_amount.unwrap_or(existing.discount_amount);
        let (subtotal, total_amount) = compute_totals(&amounts, tax, discount);

        let due_date = input.due_date.unwrap_or(existing.due_date);
        let status = InvoiceStatus::derived(existing.status(), due_date, now.date_naive());

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET subtotal = $3,
                total_amount = $4,
                status = $5,
                updated_utc = $6
            WHERE org_id = $1 AND invoice_id = $2
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(org_id)
        .bind(invoice_id)
        .bind(subtotal)
        .bind(total_amount)
        .bind(status.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to recompute totals: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit update: {}", e))
        })?;

        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, "Invoice updated");

        Ok(Some(invoice))
    }

    /// Delete an invoice within the caller's org.
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, org_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let result = sqlx::query("DELETE FROM invoices WHERE org_id = $1 AND invoice_id = $2")
            .bind(org_id)
            .bind(invoice_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e))
            })?;

        timer.observe_duration();

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(invoice_id = %invoice_id, "Invoice deleted");
        }

        Ok(deleted)
    }

    /// Apply an explicit status transition, stamping first-entry timestamps.
    /// Returns `None` when the id does not resolve within the org.
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id, status = %to.as_str()))]
    pub async fn update_status(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
        to: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_status"])
            .start_timer();

        let mut invoice = match self.get_invoice(org_id, invoice_id).await? {
            Some(inv) => inv,
            None => return Ok(None),
        };

        let from = invoice.derived_status(now.date_naive());
        if !InvoiceStatus::can_transition(from, to) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot transition invoice from '{}' to '{}'",
                from.as_str(),
                to.as_str()
            )));
        }

        invoice.apply_transition(to, now);

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET status = $3,
                sent_at = $4,
                viewed_at = $5,
                paid_at = $6,
                updated_utc = $7
            WHERE org_id = $1 AND invoice_id = $2
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(org_id)
        .bind(invoice_id)
        .bind(&invoice.status)
        .bind(invoice.sent_at)
        .bind(invoice.viewed_at)
        .bind(invoice.paid_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update status: {}", e)))?;

        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, status = %invoice.status, "Invoice status updated");

        Ok(Some(invoice))
    }

    /// Fetch a set of invoices by id within one org. Callers compare the
    /// returned count against the requested count to reject partial batches.
    #[instrument(skip(self, invoice_ids), fields(org_id = %org_id, count = invoice_ids.len()))]
    pub async fn get_invoices_by_ids(
        &self,
        org_id: Uuid,
        invoice_ids: &[Uuid],
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoices_by_ids"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE org_id = $1 AND invoice_id = ANY($2)
            "#,
        ))
        .bind(org_id)
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Load every invoice of an org for summary aggregation.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn list_invoices_for_summary(&self, org_id: Uuid) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices_for_summary"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE org_id = $1
            ORDER BY issue_date
            "#,
        ))
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load invoices for summary: {}", e))
        })?;

        timer.observe_duration();

        Ok(invoices)
    }

    // -------------------------------------------------------------------------
    // Collaborator lookups (leases, tenants)
    // -------------------------------------------------------------------------

    /// List active leases for an org, in stable order.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn list_active_leases(&self, org_id: Uuid) -> Result<Vec<Lease>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_leases"])
            .start_timer();

        let leases = sqlx::query_as::<_, Lease>(
            r#"
            SELECT lease_id, org_id, tenant_id, property_id, rent_amount, status,
                   start_date, end_date, created_utc
            FROM leases
            WHERE org_id = $1 AND status = $2
            ORDER BY created_utc, lease_id
            "#,
        )
        .bind(org_id)
        .bind(LeaseStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list leases: {}", e)))?;

        timer.observe_duration();

        Ok(leases)
    }

    /// Get a tenant lookup row within an org.
    #[instrument(skip(self), fields(org_id = %org_id, tenant_id = %tenant_id))]
    pub async fn get_tenant(
        &self,
        org_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<TenantRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_tenant"])
            .start_timer();

        let tenant = sqlx::query_as::<_, TenantRecord>(
            r#"
            SELECT tenant_id, org_id, property_id, full_name, created_utc
            FROM tenants
            WHERE org_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(org_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get tenant: {}", e)))?;

        timer.observe_duration();

        Ok(tenant)
    }

    /// Verify that the referenced tenant exists in this org and lives on
    /// the given property. Invariant 5 of the invoice record.
    pub async fn verify_tenant_reference(
        &self,
        org_id: Uuid,
        tenant_id: Uuid,
        property_id: Uuid,
    ) -> Result<TenantRecord, AppError> {
        let tenant = self
            .get_tenant(org_id, tenant_id)
            .await?
            .ok_or_else(|| AppError::InvalidReference(anyhow::anyhow!("Tenant not found in organization")))?;

        if tenant.property_id != property_id {
            return Err(AppError::InvalidReference(anyhow::anyhow!(
                "Tenant does not belong to the referenced property"
            )));
        }

        Ok(tenant)
    }

    // -------------------------------------------------------------------------
    // Recurring generation support
    // -------------------------------------------------------------------------

    /// Lease ids that already have a non-terminal invoice due on the given
    /// month start. The fast path of the idempotency check.
    #[instrument(skip(self), fields(org_id = %org_id, due_date = %due_date))]
    pub async fn lease_ids_billed_for_month(
        &self,
        org_id: Uuid,
        due_date: NaiveDate,
    ) -> Result<HashSet<Uuid>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lease_ids_billed_for_month"])
            .start_timer();

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT lease_id
            FROM invoices
            WHERE org_id = $1
              AND due_date = $2
              AND lease_id IS NOT NULL
              AND status NOT IN ('paid', 'cancelled', 'refunded')
            "#,
        )
        .bind(org_id)
        .bind(due_date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load billed leases: {}", e))
        })?;

        timer.observe_duration();

        Ok(ids.into_iter().collect())
    }

    /// Count invoices due in the target month, seeding the human-readable
    /// sequence. Deterministic across retries; not a correctness mechanism.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn count_invoices_for_month(
        &self,
        org_id: Uuid,
        month_start: NaiveDate,
        next_month_start: NaiveDate,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM invoices
            WHERE org_id = $1 AND due_date >= $2 AND due_date < $3
            "#,
        )
        .bind(org_id)
        .bind(month_start)
        .bind(next_month_start)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count month invoices: {}", e))
        })?;

        Ok(count)
    }

    /// Insert one generated invoice with its single rent line item.
    ///
    /// A unique violation on the `(lease_id, due_date)` partial index means
    /// a concurrent run already billed this lease/month; that is reported as
    /// a skip, never surfaced as an error. This is the correctness layer of
    /// the idempotency guarantee; the in-memory check is only a fast path.
    #[instrument(skip(self, planned), fields(org_id = %planned.org_id, lease_id = %planned.lease_id))]
    pub async fn insert_generated_invoice(
        &self,
        planned: &PlannedInvoice,
        now: DateTime<Utc>,
    ) -> Result<GeneratedInsert, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_generated_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice_id = Uuid::new_v4();
        let insert = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (
                invoice_id, org_id, invoice_number, tenant_id, property_id, lease_id,
                title, category, priority, status, subtotal, tax_amount, discount_amount, total_amount,
                issue_date, due_date, is_recurring, frequency, attachments, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'rent', 'medium', 'pending',
                    $8, 0, 0, $8, $9, $9, TRUE, 'monthly', '[]'::jsonb, $10, $10)
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(invoice_id)
        .bind(planned.org_id)
        .bind(&planned.invoice_number)
        .bind(planned.tenant_id)
        .bind(planned.property_id)
        .bind(planned.lease_id)
        .bind(&planned.title)
        .bind(planned.amount)
        .bind(planned.due_date)
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        let invoice = match insert {
            Ok(inv) => inv,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                timer.observe_duration();
                return Ok(GeneratedInsert::DuplicateSkipped);
            }
            Err(e) => {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to insert generated invoice: {}",
                    e
                )));
            }
        };

        let line = NewLineItem {
            description: planned.line_description.clone(),
            quantity: Decimal::ONE,
            unit_price: planned.amount,
            tax_rate: Decimal::ZERO,
            sort_order: 0,
        };
        insert_line_item(&mut tx, planned.org_id, invoice_id, &line, now).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit generated invoice: {}", e))
        })?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            "Recurring invoice created"
        );

        Ok(GeneratedInsert::Created(invoice))
    }
}

/// Insert one line item inside an open transaction, recomputing its amount.
async fn insert_line_item(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    org_id: Uuid,
    invoice_id: Uuid,
    item: &NewLineItem,
    now: DateTime<Utc>,
) -> Result<LineItem, AppError> {
    let line_item_id = Uuid::new_v4();
    let line_item = sqlx::query_as::<_, LineItem>(&format!(
        r#"
        INSERT INTO invoice_line_items (
            line_item_id, invoice_id, org_id, description, quantity, unit_price,
            tax_rate, amount, sort_order, created_utc
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {LINE_ITEM_COLUMNS}
        "#,
    ))
    .bind(line_item_id)
    .bind(invoice_id)
    .bind(org_id)
    .bind(&item.description)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.tax_rate)
    .bind(item.amount())
    .bind(item.sort_order)
    .bind(now)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert line item: {}", e)))?;

    Ok(line_item)
}
