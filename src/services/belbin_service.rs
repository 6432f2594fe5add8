use crate::dto::belbin_dto::{
    BelbinRequirementsRequest, BelbinRoleCreate, FitEvaluation, FitVerdict, PositionRequirements,
    RequirementView, RoleFit,
};
use crate::error::{Error, Result};
use crate::models::belbin::BelbinRole;
use sqlx::PgPool;
use std::collections::HashMap;

/// Role totals are normalized against the conventional 70-point Belbin scale
/// before comparing with a requirement's minimum.
const FIT_SCALE: f64 = 70.0;

pub fn normalize_score(total: f64) -> f64 {
    total / FIT_SCALE * 100.0
}

/// Joins an attempt's role totals with the position's requirements. Roles
/// required but never scored count as zero.
pub fn evaluate_roles(
    totals: &[(i64, Option<String>, f64)],
    requirements: &[(i64, i32, bool)],
) -> Vec<RoleFit> {
    let by_role: HashMap<i64, (&Option<String>, f64)> = totals
        .iter()
        .map(|(role_id, name, total)| (*role_id, (name, *total)))
        .collect();

    requirements
        .iter()
        .map(|(role_id, min_score, is_key)| {
            let (role_name, total_score) = by_role
                .get(role_id)
                .map(|(name, total)| ((*name).clone(), *total))
                .unwrap_or((None, 0.0));
            let normalized = normalize_score(total_score);
            RoleFit {
                role_id: *role_id,
                role_name,
                total_score,
                normalized_score: normalized,
                min_score: *min_score,
                is_key: *is_key,
                meets_requirement: normalized >= *min_score as f64,
            }
        })
        .collect()
}

/// Overall verdict from the fraction of key requirements met. A position
/// with no key requirements has nothing to fail against.
pub fn overall_verdict(roles: &[RoleFit]) -> FitVerdict {
    let key_roles: Vec<&RoleFit> = roles.iter().filter(|r| r.is_key).collect();
    if key_roles.is_empty() {
        return FitVerdict::High;
    }
    let met = key_roles.iter().filter(|r| r.meets_requirement).count();
    let ratio = met as f64 / key_roles.len() as f64;
    if ratio >= 0.8 {
        FitVerdict::High
    } else if ratio >= 0.5 {
        FitVerdict::Medium
    } else {
        FitVerdict::Low
    }
}

#[derive(Clone)]
pub struct BelbinService {
    pool: PgPool,
}

impl BelbinService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_role(&self, owner_id: i64, data: BelbinRoleCreate) -> Result<BelbinRole> {
        sqlx::query_as::<_, BelbinRole>(
            r#"INSERT INTO belbin_roles (name, description, created_by_id)
               VALUES ($1, $2, $3)
               RETURNING id, name, description, created_by_id"#,
        )
        .bind(&data.name)
        .bind(&data.description)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if let sqlx::Error::Database(db) = &err {
                if db.code().as_deref() == Some("23505") {
                    return Error::Conflict("Role with this name already exists".to_string());
                }
            }
            err.into()
        })
    }

    pub async fn get_roles(&self, owner_id: i64) -> Result<Vec<BelbinRole>> {
        let roles = sqlx::query_as::<_, BelbinRole>(
            r#"SELECT id, name, description, created_by_id
               FROM belbin_roles WHERE created_by_id = $1 ORDER BY name"#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    pub async fn get_role(&self, owner_id: i64, role_id: i64) -> Result<BelbinRole> {
        sqlx::query_as::<_, BelbinRole>(
            r#"SELECT id, name, description, created_by_id
               FROM belbin_roles WHERE id = $1 AND created_by_id = $2"#,
        )
        .bind(role_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Belbin role not found".to_string()))
    }

    pub async fn update_role(
        &self,
        owner_id: i64,
        role_id: i64,
        data: BelbinRoleCreate,
    ) -> Result<BelbinRole> {
        self.get_role(owner_id, role_id).await?;

        let role = sqlx::query_as::<_, BelbinRole>(
            r#"UPDATE belbin_roles SET name = $1, description = $2 WHERE id = $3
               RETURNING id, name, description, created_by_id"#,
        )
        .bind(&data.name)
        .bind(&data.description)
        .bind(role_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(role)
    }

    pub async fn delete_role(&self, owner_id: i64, role_id: i64) -> Result<()> {
        self.get_role(owner_id, role_id).await?;
        sqlx::query("DELETE FROM belbin_roles WHERE id = $1")
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Creates or updates requirement rows for one position; payload entries
    /// carrying an id update in place.
    pub async fn save_requirements(
        &self,
        owner_id: i64,
        req: BelbinRequirementsRequest,
    ) -> Result<PositionRequirements> {
        let position_title = sqlx::query_scalar::<_, String>(
            "SELECT title FROM positions WHERE id = $1 AND created_by_id = $2",
        )
        .bind(req.position_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Position not found".to_string()))?;

        let mut tx = self.pool.begin().await?;
        for item in &req.requirements {
            match item.id {
                Some(id) => {
                    sqlx::query(
                        r#"UPDATE belbin_position_requirements
                           SET role_id = $1, min_score = $2, is_key = $3
                           WHERE id = $4 AND position_id = $5"#,
                    )
                    .bind(item.role_id)
                    .bind(item.min_score)
                    .bind(item.is_key)
                    .bind(id)
                    .bind(req.position_id)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query(
                        r#"INSERT INTO belbin_position_requirements
                               (position_id, role_id, min_score, is_key)
                           VALUES ($1, $2, $3, $4)"#,
                    )
                    .bind(req.position_id)
                    .bind(item.role_id)
                    .bind(item.min_score)
                    .bind(item.is_key)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }
        tx.commit().await?;

        let requirements = self.load_requirement_views(req.position_id).await?;
        Ok(PositionRequirements {
            position_id: req.position_id,
            position_title,
            requirements,
        })
    }

    /// All of the owner's requirements, grouped by position.
    pub async fn get_requirements(&self, owner_id: i64) -> Result<Vec<PositionRequirements>> {
        let positions = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, title FROM positions WHERE created_by_id = $1 ORDER BY title",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped = Vec::new();
        for (position_id, position_title) in positions {
            let requirements = self.load_requirement_views(position_id).await?;
            if !requirements.is_empty() {
                grouped.push(PositionRequirements {
                    position_id,
                    position_title,
                    requirements,
                });
            }
        }
        Ok(grouped)
    }

    pub async fn delete_requirement(&self, owner_id: i64, requirement_id: i64) -> Result<()> {
        let deleted = sqlx::query(
            r#"DELETE FROM belbin_position_requirements
               WHERE id = $1 AND position_id IN (
                   SELECT id FROM positions WHERE created_by_id = $2
               )"#,
        )
        .bind(requirement_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if deleted == 0 {
            return Err(Error::NotFound("Requirement not found".to_string()));
        }
        Ok(())
    }

    async fn load_requirement_views(&self, position_id: i64) -> Result<Vec<RequirementView>> {
        let views = sqlx::query_as::<_, RequirementRow>(
            r#"SELECT r.id, r.position_id, r.role_id, r.min_score, r.is_key,
                      br.name AS role_name, br.description AS role_description
               FROM belbin_position_requirements r
               JOIN belbin_roles br ON br.id = r.role_id
               WHERE r.position_id = $1
               ORDER BY r.is_key DESC, br.name"#,
        )
        .bind(position_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| RequirementView {
            id: row.id,
            position_id: row.position_id,
            role_id: row.role_id,
            min_score: row.min_score,
            is_key: row.is_key,
            role_name: row.role_name,
            role_description: row.role_description,
        })
        .collect();
        Ok(views)
    }

    /// Read-only comparison of a completed attempt's role totals against the
    /// employee's position requirements. Never feeds back into scoring.
    pub async fn evaluate_fit(&self, test_id: i64, employee_id: i64) -> Result<FitEvaluation> {
        let position_id = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT position_id FROM employees WHERE id = $1",
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten()
        .ok_or_else(|| Error::BadRequest("Employee has no position".to_string()))?;

        let result_id = sqlx::query_scalar::<_, i64>(
            r#"SELECT id FROM test_results
               WHERE test_id = $1 AND employee_id = $2 AND is_completed = TRUE"#,
        )
        .bind(test_id)
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Completed test result not found".to_string()))?;

        let totals = sqlx::query_as::<_, (i64, Option<String>, f64)>(
            r#"SELECT btr.role_id, br.name, btr.total_score
               FROM belbin_test_results btr
               LEFT JOIN belbin_roles br ON br.id = btr.role_id
               WHERE btr.test_result_id = $1"#,
        )
        .bind(result_id)
        .fetch_all(&self.pool)
        .await?;

        let requirements = sqlx::query_as::<_, (i64, i32, bool)>(
            r#"SELECT role_id, min_score, is_key
               FROM belbin_position_requirements WHERE position_id = $1"#,
        )
        .bind(position_id)
        .fetch_all(&self.pool)
        .await?;

        let roles = evaluate_roles(&totals, &requirements);
        let overall = overall_verdict(&roles);
        Ok(FitEvaluation {
            test_id,
            employee_id,
            overall,
            roles,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RequirementRow {
    id: i64,
    position_id: i64,
    role_id: i64,
    min_score: i32,
    is_key: bool,
    role_name: String,
    role_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(entries: &[(i64, f64)]) -> Vec<(i64, Option<String>, f64)> {
        entries
            .iter()
            .map(|(role_id, total)| (*role_id, Some(format!("role {}", role_id)), *total))
            .collect()
    }

    #[test]
    fn normalization_uses_the_seventy_point_scale() {
        assert!((normalize_score(35.0) - 50.0).abs() < 1e-9);
        assert!((normalize_score(70.0) - 100.0).abs() < 1e-9);
        assert_eq!(normalize_score(0.0), 0.0);
    }

    #[test]
    fn required_role_without_a_total_counts_as_zero() {
        let roles = evaluate_roles(&totals(&[]), &[(1, 40, true)]);
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].total_score, 0.0);
        assert!(!roles[0].meets_requirement);
    }

    #[test]
    fn meets_requirement_compares_normalized_scores() {
        // 35 of 70 normalizes to 50
        let roles = evaluate_roles(&totals(&[(1, 35.0)]), &[(1, 50, true)]);
        assert!(roles[0].meets_requirement);

        let roles = evaluate_roles(&totals(&[(1, 34.0)]), &[(1, 50, true)]);
        assert!(!roles[0].meets_requirement);
    }

    #[test]
    fn no_key_roles_reads_as_high() {
        let roles = evaluate_roles(&totals(&[(1, 0.0)]), &[(1, 90, false)]);
        assert_eq!(overall_verdict(&roles), FitVerdict::High);
        assert_eq!(overall_verdict(&[]), FitVerdict::High);
    }

    #[test]
    fn verdict_follows_the_key_role_ratio() {
        let requirements = vec![(1, 10, true), (2, 10, true), (3, 10, true), (4, 10, true)];

        // 4 of 4 met
        let all = totals(&[(1, 70.0), (2, 70.0), (3, 70.0), (4, 70.0)]);
        assert_eq!(
            overall_verdict(&evaluate_roles(&all, &requirements)),
            FitVerdict::High
        );

        // 2 of 4 met
        let half = totals(&[(1, 70.0), (2, 70.0)]);
        assert_eq!(
            overall_verdict(&evaluate_roles(&half, &requirements)),
            FitVerdict::Medium
        );

        // 1 of 4 met
        let one = totals(&[(1, 70.0)]);
        assert_eq!(
            overall_verdict(&evaluate_roles(&one, &requirements)),
            FitVerdict::Low
        );
    }

    #[test]
    fn non_key_roles_do_not_dilute_the_verdict() {
        let requirements = vec![(1, 10, true), (2, 99, false)];
        let roles = evaluate_roles(&totals(&[(1, 70.0)]), &requirements);
        assert_eq!(overall_verdict(&roles), FitVerdict::High);
    }
}
