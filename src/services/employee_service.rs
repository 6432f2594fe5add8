use crate::dto::employee_dto::{
    AccountKind, BatchAccountItem, BatchAccountRequest, EmployeeCreate, EmployeeMinimal,
    EmployeeUpdate, ItemError, ProvisionReport, ProvisionedAccount,
};
use crate::error::{Error, Result};
use crate::models::employee::Employee;
use crate::services::account_service::{AccountService, NewAccount};
use sqlx::PgPool;

const EMPLOYEE_COLUMNS: &str = "id, last_name, first_name, middle_name, birth_date, phone, \
     email, position_id, hire_date, is_admin, created_by_id, clerk_id";

fn map_unique_email(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return Error::Conflict("Employee with this email already exists".to_string());
        }
    }
    err.into()
}

#[derive(Clone)]
pub struct EmployeeService {
    pool: PgPool,
}

impl EmployeeService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolves the caller to an admin employee row; anyone else is turned
    /// away before the handler touches data.
    pub async fn check_permissions(&self, clerk_id: &str) -> Result<Employee> {
        sqlx::query_as::<_, Employee>(&format!(
            "SELECT {} FROM employees WHERE clerk_id = $1 AND is_admin = TRUE",
            EMPLOYEE_COLUMNS
        ))
        .bind(clerk_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("User has not permissions".to_string()))
    }

    pub async fn get_by_clerk_id(&self, clerk_id: &str) -> Result<Employee> {
        sqlx::query_as::<_, Employee>(&format!(
            "SELECT {} FROM employees WHERE clerk_id = $1",
            EMPLOYEE_COLUMNS
        ))
        .bind(clerk_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Employee not found".to_string()))
    }

    pub async fn create_employee(&self, owner_id: i64, data: EmployeeCreate) -> Result<Employee> {
        sqlx::query_as::<_, Employee>(&format!(
            r#"INSERT INTO employees
                   (last_name, first_name, middle_name, birth_date, phone, email,
                    position_id, hire_date, is_admin, created_by_id)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               RETURNING {}"#,
            EMPLOYEE_COLUMNS
        ))
        .bind(&data.last_name)
        .bind(&data.first_name)
        .bind(&data.middle_name)
        .bind(data.birth_date)
        .bind(&data.phone)
        .bind(&data.email)
        .bind(data.position_id)
        .bind(data.hire_date)
        .bind(data.is_admin)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_email)
    }

    pub async fn get_employees(&self, owner_id: i64) -> Result<Vec<Employee>> {
        let employees = sqlx::query_as::<_, Employee>(&format!(
            "SELECT {} FROM employees WHERE created_by_id = $1 ORDER BY id",
            EMPLOYEE_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(employees)
    }

    pub async fn get_employee(&self, owner_id: i64, employee_id: i64) -> Result<Employee> {
        sqlx::query_as::<_, Employee>(&format!(
            "SELECT {} FROM employees WHERE id = $1 AND created_by_id = $2",
            EMPLOYEE_COLUMNS
        ))
        .bind(employee_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Employee not found".to_string()))
    }

    pub async fn update_employee(
        &self,
        owner_id: i64,
        employee_id: i64,
        data: EmployeeUpdate,
    ) -> Result<Employee> {
        // Ownership first, so a foreign id reads as missing rather than 409.
        self.get_employee(owner_id, employee_id).await?;

        sqlx::query_as::<_, Employee>(&format!(
            r#"UPDATE employees SET
                   last_name = COALESCE($1, last_name),
                   first_name = COALESCE($2, first_name),
                   middle_name = COALESCE($3, middle_name),
                   birth_date = COALESCE($4, birth_date),
                   phone = COALESCE($5, phone),
                   email = COALESCE($6, email),
                   position_id = COALESCE($7, position_id),
                   hire_date = COALESCE($8, hire_date)
               WHERE id = $9
               RETURNING {}"#,
            EMPLOYEE_COLUMNS
        ))
        .bind(&data.last_name)
        .bind(&data.first_name)
        .bind(&data.middle_name)
        .bind(data.birth_date)
        .bind(&data.phone)
        .bind(&data.email)
        .bind(data.position_id)
        .bind(data.hire_date)
        .bind(employee_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_email)
    }

    /// Deletes the directory account first so a failed external call leaves
    /// the local row intact for a retry.
    pub async fn delete_employee(&self, owner_id: i64, employee_id: i64) -> Result<()> {
        let employee = self.get_employee(owner_id, employee_id).await?;

        if let Some(clerk_id) = &employee.clerk_id {
            AccountService::new().delete_user(clerk_id).await?;
        }

        sqlx::query("DELETE FROM employees WHERE id = $1")
            .bind(employee_id)
            .execute(&self.pool)
            .await?;
        tracing::info!(employee_id, "employee deleted");
        Ok(())
    }

    /// Webhook upsert guard: the identity provider may deliver the same
    /// user-created event more than once.
    pub async fn create_account(&self, data: EmployeeMinimal) -> Result<Employee> {
        if let Ok(existing) = self.get_by_clerk_id(&data.clerk_id).await {
            return Ok(existing);
        }

        sqlx::query_as::<_, Employee>(&format!(
            r#"INSERT INTO employees (last_name, first_name, email, is_admin, clerk_id)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING {}"#,
            EMPLOYEE_COLUMNS
        ))
        .bind(&data.last_name)
        .bind(&data.first_name)
        .bind(&data.email)
        .bind(data.is_admin)
        .bind(&data.clerk_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_email)
    }

    /// Gives existing local employees directory accounts, one item at a time.
    /// Failures never abort the batch; each lands in the error list with its
    /// item index. If the local update fails after the directory account was
    /// created, the account is deleted again.
    pub async fn provision_accounts(
        &self,
        owner_id: i64,
        req: BatchAccountRequest,
    ) -> Result<ProvisionReport> {
        let mut report = ProvisionReport {
            results: Vec::new(),
            errors: Vec::new(),
        };

        for (index, item) in req.employees.iter().enumerate() {
            match self.provision_one(owner_id, item).await {
                Ok(account) => report.results.push(account),
                Err(err) => {
                    tracing::warn!(index, error = %err, "batch provisioning item failed");
                    report.errors.push(ItemError {
                        index,
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    async fn provision_one(
        &self,
        owner_id: i64,
        item: &BatchAccountItem,
    ) -> Result<ProvisionedAccount> {
        let employee = self.get_employee(owner_id, item.employee_id).await?;
        if employee.clerk_id.is_some() {
            return Err(Error::Conflict(
                "Employee already has an account".to_string(),
            ));
        }

        let email = item.email.clone().or_else(|| employee.email.clone());
        let account = match item.account_type {
            AccountKind::Link => {
                let Some(_) = &email else {
                    return Err(Error::BadRequest(
                        "Email is required for link accounts".to_string(),
                    ));
                };
                NewAccount {
                    first_name: employee.first_name.clone(),
                    last_name: employee.last_name.clone(),
                    email: email.clone(),
                    skip_password: true,
                    ..NewAccount::default()
                }
            }
            AccountKind::EmailPassword => {
                if email.is_none() || item.password.is_none() {
                    return Err(Error::BadRequest(
                        "Email and password are required".to_string(),
                    ));
                }
                NewAccount {
                    first_name: employee.first_name.clone(),
                    last_name: employee.last_name.clone(),
                    email: email.clone(),
                    password: item.password.clone(),
                    ..NewAccount::default()
                }
            }
            AccountKind::UsernamePassword => {
                if item.username.is_none() || item.password.is_none() {
                    return Err(Error::BadRequest(
                        "Username and password are required".to_string(),
                    ));
                }
                NewAccount {
                    first_name: employee.first_name.clone(),
                    last_name: employee.last_name.clone(),
                    username: item.username.clone(),
                    password: item.password.clone(),
                    ..NewAccount::default()
                }
            }
        };

        let accounts = AccountService::new();
        let clerk_id = accounts.create_user(&account).await?;

        let updated = sqlx::query("UPDATE employees SET clerk_id = $1, email = COALESCE($2, email) WHERE id = $3")
            .bind(&clerk_id)
            .bind(&email)
            .bind(employee.id)
            .execute(&self.pool)
            .await;

        if let Err(err) = updated {
            // Roll the directory account back; a dangling account with no
            // local row would be unreachable from this system.
            if let Err(cleanup) = accounts.delete_user(&clerk_id).await {
                tracing::error!(%clerk_id, error = %cleanup, "failed to roll back directory account");
            }
            return Err(err.into());
        }

        if item.account_type == AccountKind::Link {
            if let Some(email) = &email {
                accounts.invite_by_email(email).await?;
            }
        }

        let position_title = match employee.position_id {
            Some(position_id) => {
                sqlx::query_scalar::<_, String>("SELECT title FROM positions WHERE id = $1")
                    .bind(position_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => None,
        };

        let full_name = [&employee.last_name, &employee.first_name, &employee.middle_name]
            .into_iter()
            .flatten()
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        tracing::info!(employee_id = employee.id, %clerk_id, "directory account provisioned");
        Ok(ProvisionedAccount {
            employee_id: employee.id,
            clerk_id,
            full_name,
            email,
            username: item.username.clone(),
            position_title,
        })
    }

    pub async fn update_profile(&self, clerk_id: &str, data: EmployeeUpdate) -> Result<Employee> {
        let employee = self.get_by_clerk_id(clerk_id).await?;

        sqlx::query_as::<_, Employee>(&format!(
            r#"UPDATE employees SET
                   last_name = COALESCE($1, last_name),
                   first_name = COALESCE($2, first_name),
                   middle_name = COALESCE($3, middle_name),
                   birth_date = COALESCE($4, birth_date),
                   phone = COALESCE($5, phone),
                   email = COALESCE($6, email),
                   position_id = COALESCE($7, position_id),
                   hire_date = COALESCE($8, hire_date)
               WHERE id = $9
               RETURNING {}"#,
            EMPLOYEE_COLUMNS
        ))
        .bind(&data.last_name)
        .bind(&data.first_name)
        .bind(&data.middle_name)
        .bind(data.birth_date)
        .bind(&data.phone)
        .bind(&data.email)
        .bind(data.position_id)
        .bind(data.hire_date)
        .bind(employee.id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_email)
    }

    pub async fn delete_profile(&self, clerk_id: &str) -> Result<()> {
        let employee = self.get_by_clerk_id(clerk_id).await?;

        AccountService::new().delete_user(clerk_id).await?;

        sqlx::query("DELETE FROM employees WHERE id = $1")
            .bind(employee.id)
            .execute(&self.pool)
            .await?;
        tracing::info!(employee_id = employee.id, "profile deleted");
        Ok(())
    }
}
