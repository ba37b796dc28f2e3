/*!
The account file.

Accounts are kept in a single CSV file, one `Account` per line, columns in
the order of `user::COLUMNS`, no header row. See `codec` for the quoting
rules.

```csv
a@mchs.org,$2b$10$...,Alice,555-0100,"12 Oak St, Apt 3",Band,Weekdays,07:10,16:30,passenger,,,,,mom@example.com,Venmo
```

The `Store` is the only thing that reads or writes the file. It keeps a
cache of the accounts it has seen, keyed by email; the cache is filled from
the file on a miss and updated by every write this process makes. The file
is the authority: anything not in the cache is looked for there before it
is declared absent.

Methods that write take `&mut self`; whoever shares a `Store` is expected
to put it behind a lock, which is what makes `insert_if_absent()` a single
step as far as this process is concerned.
*/
use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::codec;
use crate::user::{is_header, Account};

#[derive(Debug, PartialEq)]
pub struct DbError(String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl std::error::Error for DbError {}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> DbError {
        DbError(format!("Account file: {}", &e))
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

/// Join serialized rows the way the file wants them: one `\n` after each.
fn rows_to_text<I: IntoIterator<Item = String>>(rows: I) -> String {
    let mut text = String::new();
    for row in rows {
        text.push_str(&row);
        text.push('\n');
    }
    text
}

#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    cache: HashMap<String, Account>,
}

impl Store {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        log::trace!("Store::new( {} ) called.", path.display());

        Self { path, cache: HashMap::new() }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Raw file contents, or `None` if there is no file yet.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>, DbError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DbError::from(e).annotate("Unable to read")),
        }
    }

    /// Decoded rows with any leading header row(s) removed.
    async fn read_rows(&self) -> Result<Option<Vec<Vec<String>>>, DbError> {
        let bytes = match self.read_bytes().await? {
            Some(bytes) => bytes,
            None => { return Ok(None); },
        };

        let mut rows = codec::decode_rows(&bytes);
        let n_headers = rows.iter()
            .take_while(|fields| is_header(fields))
            .count();
        if n_headers > 0 {
            log::debug!("Skipping {} header row(s) in {}.", &n_headers, self.path.display());
            rows.drain(..n_headers);
        }

        Ok(Some(rows))
    }

    /**
    Normalize the file in place.

    Every row is re-read (respecting quotes), padded or truncated to the
    full set of columns, and written back out with proper quoting and
    exactly one `\n` after each row. A header row is dropped.

    Returns the number of rows written, or `None` if there is no file, in
    which case nothing is created. Running this twice changes nothing the
    second time.
    */
    pub async fn migrate(&self) -> Result<Option<usize>, DbError> {
        log::trace!("Store::migrate() called.");

        let rows = match self.read_rows().await? {
            Some(rows) => rows,
            None => {
                log::info!("No account file at {}; nothing to migrate.", self.path.display());
                return Ok(None);
            },
        };

        let n_rows = rows.len();
        let text = rows_to_text(
            rows.into_iter().map(|fields| Account::from_fields(fields).to_row())
        );

        tokio::fs::write(&self.path, text.as_bytes()).await
            .map_err(|e| DbError::from(e).annotate("Unable to write migrated rows"))?;

        log::info!("Migrated {} rows in {}.", &n_rows, self.path.display());
        Ok(Some(n_rows))
    }

    /// True if the file exists, is nonempty, and doesn't end in `\n`.
    async fn lacks_final_newline(&self) -> Result<bool, DbError> {
        let mut f = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => { return Ok(false); },
            Err(e) => { return Err(e.into()); },
        };

        if f.metadata().await?.len() == 0 {
            return Ok(false);
        }

        let mut last = [0u8; 1];
        f.seek(SeekFrom::End(-1)).await?;
        f.read_exact(&mut last).await?;
        Ok(last[0] != b'\n')
    }

    /**
    Add one row to the end of the file, creating the file if necessary.

    If whatever wrote the file last didn't finish its line, that line is
    finished first, so the new row always starts a line of its own.
    */
    pub async fn append(&mut self, acct: &Account) -> Result<(), DbError> {
        log::trace!("Store::append( {:?} ) called.", &acct.email);

        let mut text = String::new();
        if self.lacks_final_newline().await
            .map_err(|e| e.annotate("Unable to check end of file"))?
        {
            text.push('\n');
        }
        text.push_str(&acct.to_row());
        text.push('\n');

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path).await
            .map_err(|e| DbError::from(e).annotate("Unable to open for appending"))?;
        f.write_all(text.as_bytes()).await
            .map_err(|e| DbError::from(e).annotate("Unable to append row"))?;
        f.flush().await?;

        self.cache.insert(acct.email.clone(), acct.clone());
        Ok(())
    }

    /// Every account in the file, in file order. No file means no accounts.
    pub async fn load_all(&self) -> Result<Vec<Account>, DbError> {
        log::trace!("Store::load_all() called.");

        let accounts: Vec<Account> = match self.read_rows().await? {
            Some(rows) => rows.into_iter().map(Account::from_fields).collect(),
            None => Vec::new(),
        };

        log::trace!("    ...load_all() read {} accounts.", accounts.len());
        Ok(accounts)
    }

    /**
    Replace the whole file with `accounts`.

    This is not incremental and not atomic with respect to anything
    outside this process; it's meant for infrequent, whole-table updates.
    The cache is replaced with exactly what was written.
    */
    pub async fn rewrite_all(&mut self, accounts: &[Account]) -> Result<(), DbError> {
        log::trace!("Store::rewrite_all( [ {} accounts ] ) called.", accounts.len());

        let text = rows_to_text(accounts.iter().map(|a| a.to_row()));
        tokio::fs::write(&self.path, text.as_bytes()).await
            .map_err(|e| DbError::from(e).annotate("Unable to rewrite"))?;

        self.fill_cache(accounts.iter().cloned());
        Ok(())
    }

    fn fill_cache<I: IntoIterator<Item = Account>>(&mut self, accounts: I) {
        self.cache.clear();
        for acct in accounts {
            // On duplicate emails in old data, the first row wins, same as
            // a linear search would find.
            self.cache.entry(acct.email.clone()).or_insert(acct);
        }
    }

    /// Throw away the cache and refill it from the file.
    pub async fn reload(&mut self) -> Result<usize, DbError> {
        log::trace!("Store::reload() called.");

        let accounts = self.load_all().await?;
        self.fill_cache(accounts);
        Ok(self.cache.len())
    }

    /// Forget everything cached; the next lookup goes to the file.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Look up an account by exact email, trying the cache before the file.
    pub async fn find(&mut self, email: &str) -> Result<Option<Account>, DbError> {
        log::trace!("Store::find( {:?} ) called.", email);

        if let Some(acct) = self.cache.get(email) {
            return Ok(Some(acct.clone()));
        }

        self.reload().await?;
        Ok(self.cache.get(email).cloned())
    }

    /**
    Append `acct` unless an account with its email already exists.

    Returns `false` (and writes nothing) if the email was taken. Because
    this takes `&mut self`, the check and the write can't be interleaved
    with another write through the same `Store`.
    */
    pub async fn insert_if_absent(&mut self, acct: &Account) -> Result<bool, DbError> {
        log::trace!("Store::insert_if_absent( {:?} ) called.", &acct.email);

        if self.find(&acct.email).await?.is_some() {
            return Ok(false);
        }

        self.append(acct).await?;
        Ok(true)
    }
}
