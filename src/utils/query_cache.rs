use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::model::stats::{AdminStats, EmployeeStats, SalaryHistoryEntry, TrendPoint};

/// What a successful write touched. Decides which cached aggregates go stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Expense { employee_id: u64 },
    SalarySlip { employee_id: u64 },
    Employee { user_id: u64 },
}

/// Short-lived cache for the dashboard aggregates.
#[derive(Clone)]
pub struct StatsCache {
    admin: Cache<(), AdminStats>,
    payroll_trend: Cache<(), Arc<Vec<TrendPoint>>>,
    expense_trend: Cache<(), Arc<Vec<TrendPoint>>>,
    employee: Cache<u64, EmployeeStats>,
    salary_history: Cache<u64, Arc<Vec<SalaryHistoryEntry>>>,
}

fn build<K, V>(ttl: Duration, capacity: u64) -> Cache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(capacity)
        .time_to_live(ttl)
        .build()
}

/// Concurrent misses on one key share a single load; a failed load is not cached.
async fn cached<K, V, E, F, Fut>(cache: &Cache<K, V>, key: K, load: F) -> Result<V, Arc<E>>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    cache.try_get_with(key, load()).await
}

impl StatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            admin: build(ttl, 1),
            payroll_trend: build(ttl, 1),
            expense_trend: build(ttl, 1),
            employee: build(ttl, 10_000),
            salary_history: build(ttl, 10_000),
        }
    }

    pub async fn admin_stats<E, F, Fut>(&self, load: F) -> Result<AdminStats, Arc<E>>
    where
        E: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AdminStats, E>>,
    {
        cached(&self.admin, (), load).await
    }

    pub async fn payroll_trend<E, F, Fut>(&self, load: F) -> Result<Arc<Vec<TrendPoint>>, Arc<E>>
    where
        E: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Vec<TrendPoint>>, E>>,
    {
        cached(&self.payroll_trend, (), load).await
    }

    pub async fn expense_trend<E, F, Fut>(&self, load: F) -> Result<Arc<Vec<TrendPoint>>, Arc<E>>
    where
        E: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Vec<TrendPoint>>, E>>,
    {
        cached(&self.expense_trend, (), load).await
    }

    pub async fn employee_stats<E, F, Fut>(&self, employee_id: u64, load: F) -> Result<EmployeeStats, Arc<E>>
    where
        E: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<EmployeeStats, E>>,
    {
        cached(&self.employee, employee_id, load).await
    }

    pub async fn salary_history<E, F, Fut>(
        &self,
        employee_id: u64,
        load: F,
    ) -> Result<Arc<Vec<SalaryHistoryEntry>>, Arc<E>>
    where
        E: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Vec<SalaryHistoryEntry>>, E>>,
    {
        cached(&self.salary_history, employee_id, load).await
    }

    pub async fn invalidate(&self, mutation: Mutation) {
        tracing::debug!(?mutation, "Invalidating cached aggregates");
        self.admin.invalidate(&()).await;

        match mutation {
            Mutation::Expense { employee_id } => {
                self.expense_trend.invalidate(&()).await;
                self.employee.invalidate(&employee_id).await;
            }
            Mutation::SalarySlip { employee_id } => {
                self.payroll_trend.invalidate(&()).await;
                self.employee.invalidate(&employee_id).await;
                self.salary_history.invalidate(&employee_id).await;
            }
            Mutation::Employee { user_id } => {
                // a deleted employee takes their slips and expenses along
                self.payroll_trend.invalidate(&()).await;
                self.expense_trend.invalidate(&()).await;
                self.employee.invalidate(&user_id).await;
                self.salary_history.invalidate(&user_id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> StatsCache {
        StatsCache::new(Duration::from_secs(60))
    }

    async fn load_admin(cache: &StatsCache, calls: &AtomicUsize) -> AdminStats {
        cache
            .admin_stats(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(AdminStats { total_employees: 3, ..Default::default() })
            })
            .await
            .unwrap()
    }

    async fn load_employee(cache: &StatsCache, id: u64, calls: &AtomicUsize) -> EmployeeStats {
        cache
            .employee_stats(id, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(EmployeeStats { total_expenses: 1, ..Default::default() })
            })
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn second_read_is_served_from_cache() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        assert_eq!(load_admin(&cache, &calls).await.total_employees, 3);
        load_admin(&cache, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn concurrent_misses_share_one_load() {
        let cache = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let slow = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            actix_web::rt::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, Infallible>(AdminStats { total_employees: 5, ..Default::default() })
        };

        let (first, second) = futures::join!(cache.admin_stats(slow), cache.admin_stats(slow));
        assert_eq!(first.unwrap().total_employees, 5);
        assert_eq!(second.unwrap().total_employees, 5);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn expense_write_invalidates_admin_and_owner_only() {
        let cache = cache();
        let admin_calls = AtomicUsize::new(0);
        let owner_calls = AtomicUsize::new(0);
        let other_calls = AtomicUsize::new(0);

        load_admin(&cache, &admin_calls).await;
        load_employee(&cache, 7, &owner_calls).await;
        load_employee(&cache, 8, &other_calls).await;

        cache.invalidate(Mutation::Expense { employee_id: 7 }).await;

        load_admin(&cache, &admin_calls).await;
        load_employee(&cache, 7, &owner_calls).await;
        load_employee(&cache, 8, &other_calls).await;

        assert_eq!(admin_calls.load(Ordering::SeqCst), 2);
        assert_eq!(owner_calls.load(Ordering::SeqCst), 2);
        assert_eq!(other_calls.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn failed_loads_are_not_cached() {
        let cache = cache();
        let first: Result<AdminStats, Arc<&str>> = cache.admin_stats(move || async move { Err("db down") }).await;
        assert!(first.is_err());

        let calls = AtomicUsize::new(0);
        load_admin(&cache, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn salary_slip_write_drops_history_and_trend() {
        let cache = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let history = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(Arc::new(Vec::<SalaryHistoryEntry>::new()))
        };
        let trend = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(Arc::new(Vec::<TrendPoint>::new()))
        };

        cache.salary_history(7, history).await.unwrap();
        cache.payroll_trend(trend).await.unwrap();
        cache.invalidate(Mutation::SalarySlip { employee_id: 7 }).await;
        cache.salary_history(7, history).await.unwrap();
        cache.payroll_trend(trend).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
