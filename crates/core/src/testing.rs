//! An in-memory [`AdminService`] for tests.
//!
//! Created resources only become visible once their operation has been
//! awaited, listings are paged, and every call is recorded so tests can
//! assert on what was (or was not) sent to the service.
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::admin::{AdminError, AdminService};
use crate::resource::{
    CreateDatabase, CreateInstance, DatabaseName, InstanceName, ManagedResource, Operation, Page,
    UpdateDdl,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    GetInstance,
    CreateInstance,
    ListInstances,
    DeleteInstance,
    GetDatabase,
    CreateDatabase,
    UpdateDdl,
    DropDatabase,
    WaitOperation,
}

#[derive(Debug, Clone)]
enum Pending {
    Instance(ManagedResource),
    Database(ManagedResource, Vec<String>),
    Ddl(String, Vec<String>),
}

#[derive(Debug, Default)]
struct State {
    instances: BTreeMap<String, ManagedResource>,
    databases: BTreeMap<String, ManagedResource>,
    ddl: HashMap<String, Vec<String>>,
    pending: HashMap<String, Pending>,
    calls: Vec<(Call, String)>,
    failures: HashMap<Call, VecDeque<AdminError>>,
    scheduled: HashMap<(Call, usize), AdminError>,
    next_op: u64,
}

#[derive(Debug)]
pub struct FakeAdmin {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for FakeAdmin {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAdmin {
    pub fn new() -> Self {
        Self::with_page_size(2)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: page_size.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seeds an instance as if some earlier run had created it.
    pub fn insert_instance(&self, name: &str, labels: HashMap<String, String>) {
        self.lock()
            .instances
            .insert(name.to_string(), ManagedResource::new(name, labels));
    }

    pub fn insert_database(&self, name: &str) {
        self.lock()
            .databases
            .insert(name.to_string(), ManagedResource::new(name, HashMap::new()));
    }

    /// Makes the next call of `call` fail with `error`. Queued errors are
    /// consumed in order.
    pub fn fail_next(&self, call: Call, error: AdminError) {
        self.lock()
            .failures
            .entry(call)
            .or_default()
            .push_back(error);
    }

    /// Makes the `nth` call (1-based, counted over the fake's lifetime) of
    /// `call` fail with `error`.
    pub fn fail_on(&self, call: Call, nth: usize, error: AdminError) {
        self.lock().scheduled.insert((call, nth), error);
    }

    pub fn has_instance(&self, name: &str) -> bool {
        self.lock().instances.contains_key(name)
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.lock().databases.contains_key(name)
    }

    pub fn instance(&self, name: &str) -> Option<ManagedResource> {
        self.lock().instances.get(name).cloned()
    }

    pub fn database_names(&self) -> Vec<String> {
        self.lock().databases.keys().cloned().collect()
    }

    pub fn ddl(&self, database: &str) -> Vec<String> {
        self.lock().ddl.get(database).cloned().unwrap_or_default()
    }

    pub fn count(&self, call: Call) -> usize {
        self.lock().calls.iter().filter(|(c, _)| *c == call).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    /// Targets of every call of the given kind, in order.
    pub fn targets(&self, call: Call) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|(c, _)| *c == call)
            .map(|(_, target)| target.clone())
            .collect()
    }

    fn record(&self, call: Call, target: &str) -> Result<(), AdminError> {
        let mut state = self.lock();
        state.calls.push((call, target.to_string()));
        let nth = state.calls.iter().filter(|(c, _)| *c == call).count();
        if let Some(err) = state.scheduled.remove(&(call, nth)) {
            return Err(err);
        }
        match state.failures.get_mut(&call).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn start(&self, pending: Pending) -> Operation {
        let mut state = self.lock();
        state.next_op += 1;
        let name = format!("operations/op-{}", state.next_op);
        state.pending.insert(name.clone(), pending);
        Operation::pending(&name)
    }
}

#[async_trait]
impl AdminService for FakeAdmin {
    async fn get_instance(&self, name: &InstanceName) -> Result<ManagedResource, AdminError> {
        let path = name.to_string();
        self.record(Call::GetInstance, &path)?;
        self.lock()
            .instances
            .get(&path)
            .cloned()
            .ok_or(AdminError::NotFound(path))
    }

    async fn create_instance(&self, request: &CreateInstance) -> Result<Operation, AdminError> {
        let path = request.name.to_string();
        self.record(Call::CreateInstance, &path)?;
        if self.has_instance(&path) {
            return Err(AdminError::AlreadyExists(path));
        }
        Ok(self.start(Pending::Instance(ManagedResource::new(
            &path,
            request.labels.clone(),
        ))))
    }

    async fn list_instances(
        &self,
        project: &str,
        filter: &str,
        page_token: Option<&str>,
    ) -> Result<Page<ManagedResource>, AdminError> {
        self.record(Call::ListInstances, project)?;
        let parent = format!("projects/{project}");
        let label = filter
            .strip_prefix("labels.")
            .and_then(|f| f.strip_suffix(":*"));
        let matching: Vec<ManagedResource> = self
            .lock()
            .instances
            .values()
            .filter(|r| r.parent() == parent)
            .filter(|r| label.is_none_or(|l| r.labels.contains_key(l)))
            .cloned()
            .collect();

        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| AdminError::Decode(format!("bad page token {token}")))?,
            None => 0,
        };
        let end = (start + self.page_size).min(matching.len());
        let items = matching.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < matching.len()).then(|| end.to_string());
        Ok(Page {
            items,
            next_page_token,
        })
    }

    async fn delete_instance(&self, name: &str) -> Result<(), AdminError> {
        self.record(Call::DeleteInstance, name)?;
        let mut state = self.lock();
        state
            .instances
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AdminError::NotFound(name.to_string()))?;
        let prefix = format!("{name}/databases/");
        state.databases.retain(|db, _| !db.starts_with(&prefix));
        Ok(())
    }

    async fn get_database(&self, name: &DatabaseName) -> Result<ManagedResource, AdminError> {
        let path = name.to_string();
        self.record(Call::GetDatabase, &path)?;
        self.lock()
            .databases
            .get(&path)
            .cloned()
            .ok_or(AdminError::NotFound(path))
    }

    async fn create_database(
        &self,
        instance: &InstanceName,
        request: &CreateDatabase,
    ) -> Result<Operation, AdminError> {
        let parent = instance.to_string();
        self.record(Call::CreateDatabase, &parent)?;
        if !self.has_instance(&parent) {
            return Err(AdminError::NotFound(parent));
        }
        let id = request
            .create_statement
            .trim_start_matches("CREATE DATABASE ")
            .trim_matches('`');
        let path = instance.database(id).to_string();
        if self.has_database(&path) {
            return Err(AdminError::AlreadyExists(path));
        }
        Ok(self.start(Pending::Database(
            ManagedResource::new(&path, HashMap::new()),
            request.extra_statements.clone(),
        )))
    }

    async fn update_database_ddl(
        &self,
        database: &DatabaseName,
        request: &UpdateDdl,
    ) -> Result<Operation, AdminError> {
        let path = database.to_string();
        self.record(Call::UpdateDdl, &path)?;
        if !self.has_database(&path) {
            return Err(AdminError::NotFound(path));
        }
        Ok(self.start(Pending::Ddl(path, request.statements.clone())))
    }

    async fn drop_database(&self, name: &str) -> Result<(), AdminError> {
        self.record(Call::DropDatabase, name)?;
        self.lock()
            .databases
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AdminError::NotFound(name.to_string()))
    }

    async fn wait_operation(&self, operation: &Operation) -> Result<(), AdminError> {
        self.record(Call::WaitOperation, &operation.name)?;
        let mut state = self.lock();
        let pending = state
            .pending
            .remove(&operation.name)
            .ok_or_else(|| AdminError::NotFound(operation.name.clone()))?;
        match pending {
            Pending::Instance(resource) => {
                if state.instances.contains_key(&resource.name) {
                    return Err(AdminError::AlreadyExists(resource.name));
                }
                state.instances.insert(resource.name.clone(), resource);
            }
            Pending::Database(resource, statements) => {
                state.ddl.insert(resource.name.clone(), statements);
                state.databases.insert(resource.name.clone(), resource);
            }
            Pending::Ddl(path, statements) => {
                state.ddl.entry(path).or_default().extend(statements);
            }
        }
        Ok(())
    }
}
