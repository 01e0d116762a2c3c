//! Host doubles for the kernel collaborators.
//!
//! Threads stand in for kernel threads and `park`/`unpark` for
//! block/unblock, so blocking paths run for real under `cargo test`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, Thread};

use crate::cpu::{Cpu, IntrLevel, ThreadId};
use crate::drivers::ConsoleDevice;
use crate::fs::{File, FileSystem};
use crate::kernel::{Collaborators, Kernel};
use crate::mm::{AddressSpace, Mapping, PageFlags, PhysAddr, VirtAddr, PAGE_SIZE, PHYS_BASE};
use crate::process::{ExitNotifier, Loader, Pid, Process};
use crate::trap::{TrapExit, TrapFrame};

// -- cpu ---------------------------------------------------------------------

static THREADS: Mutex<BTreeMap<u64, Thread>> = Mutex::new(BTreeMap::new());
static NEXT_THREAD: AtomicUsize = AtomicUsize::new(1_000_000);

std::thread_local! {
    static CURRENT: u64 = {
        let id = NEXT_THREAD.fetch_add(1, Ordering::Relaxed) as u64;
        THREADS.lock().unwrap().insert(id, thread::current());
        id
    };
}

/// Scheduler double: every host thread is a kernel thread.
#[derive(Debug, Default)]
pub struct HostCpu;

impl HostCpu {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Cpu for HostCpu {
    fn current_thread(&self) -> ThreadId {
        ThreadId(CURRENT.with(|id| *id))
    }

    fn block_current(&self) {
        thread::park();
    }

    fn unblock(&self, thread: ThreadId) {
        if let Some(handle) = THREADS.lock().unwrap().get(&thread.0) {
            handle.unpark();
        }
    }

    fn disable_interrupts(&self) -> IntrLevel {
        IntrLevel::On
    }

    fn restore_interrupts(&self, _level: IntrLevel) {}
}

// -- memory ------------------------------------------------------------------

type Page = (PageFlags, Box<[u8; PAGE_SIZE]>);

/// Address space double backed by a page map.
///
/// Clones share the same pages.
#[derive(Clone, Default)]
pub struct MemSpace {
    pages: Arc<Mutex<BTreeMap<usize, Page>>>,
}

impl MemSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `count` zeroed pages starting at the page holding `addr`.
    pub fn map(&self, addr: usize, count: usize, flags: PageFlags) {
        let first = VirtAddr::new(addr).page_number();
        let mut pages = self.pages.lock().unwrap();
        for page in first..first + count {
            pages.insert(page, (flags, Box::new([0; PAGE_SIZE])));
        }
    }

    /// Store bytes at `addr`; the pages must be mapped.
    pub fn poke(&self, addr: usize, bytes: &[u8]) {
        // SAFETY: test memory is plain heap pages.
        unsafe { self.copy_to_user(VirtAddr::new(addr), bytes) }
    }

    /// Store little-endian words at `addr`.
    pub fn poke_words(&self, addr: usize, words: &[u32]) {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.poke(addr, &bytes);
    }

    /// Load `len` bytes from `addr`.
    pub fn peek(&self, addr: usize, len: usize) -> Vec<u8> {
        let mut bytes = vec![0; len];
        // SAFETY: test memory is plain heap pages.
        unsafe { self.copy_from_user(VirtAddr::new(addr), &mut bytes) };
        bytes
    }

    fn with_bytes(&self, addr: VirtAddr, len: usize, mut f: impl FnMut(usize, &mut [u8])) {
        let mut pages = self.pages.lock().unwrap();
        let mut done = 0;
        while done < len {
            let at = VirtAddr::new(addr.as_usize() + done);
            let offset = at.page_offset();
            let n = (PAGE_SIZE - offset).min(len - done);
            let (_, page) = pages
                .get_mut(&at.page_number())
                .unwrap_or_else(|| panic!("kernel touched unmapped user address {}", at));
            f(done, &mut page[offset..offset + n]);
            done += n;
        }
    }
}

impl AddressSpace for MemSpace {
    fn translate(&self, addr: VirtAddr) -> Option<Mapping> {
        let pages = self.pages.lock().unwrap();
        pages.get(&addr.page_number()).map(|(flags, page)| Mapping {
            phys: PhysAddr::new(page.as_ptr() as usize),
            flags: *flags,
        })
    }

    unsafe fn copy_from_user(&self, src: VirtAddr, dst: &mut [u8]) {
        let len = dst.len();
        self.with_bytes(src, len, |at, page| {
            let n = page.len();
            dst[at..at + n].copy_from_slice(page);
        });
    }

    unsafe fn copy_to_user(&self, dst: VirtAddr, src: &[u8]) {
        self.with_bytes(dst, src.len(), |at, page| {
            let n = page.len();
            page.copy_from_slice(&src[at..at + n]);
        });
    }
}

// -- filesystem --------------------------------------------------------------

#[derive(Default)]
struct FsState {
    files: BTreeMap<String, Arc<Mutex<Vec<u8>>>>,
}

/// Flat in-memory filesystem. Clones share state.
#[derive(Clone, Default)]
pub struct MemFs {
    state: Arc<Mutex<FsState>>,
    open: Arc<AtomicUsize>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file with `contents`; false if the name exists.
    pub fn add(&self, name: &str, contents: &[u8]) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.files.contains_key(name) {
            return false;
        }
        state
            .files
            .insert(name.into(), Arc::new(Mutex::new(contents.to_vec())));
        true
    }

    /// Open a file outside of any process.
    pub fn open_file(&self, name: &str) -> Option<Box<dyn File>> {
        let data = self.state.lock().unwrap().files.get(name)?.clone();
        self.open.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(MemFile {
            data,
            pos: 0,
            open: Some(self.open.clone()),
        }))
    }

    /// Current contents of a file.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let data = state.files.get(name)?;
        let bytes = data.lock().unwrap().clone();
        Some(bytes)
    }

    /// Number of file objects not yet dropped.
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

impl FileSystem for MemFs {
    fn create(&mut self, name: &str, size: usize) -> bool {
        !name.is_empty() && self.add(name, &vec![0; size])
    }

    fn open(&mut self, name: &str) -> Option<Box<dyn File>> {
        self.open_file(name)
    }

    fn remove(&mut self, name: &str) -> bool {
        self.state.lock().unwrap().files.remove(name).is_some()
    }
}

/// Fixed-length file; writes never extend it.
pub struct MemFile {
    data: Arc<Mutex<Vec<u8>>>,
    pos: usize,
    open: Option<Arc<AtomicUsize>>,
}

impl MemFile {
    /// A file that belongs to no filesystem.
    pub fn detached(contents: &[u8]) -> Self {
        Self {
            data: Arc::new(Mutex::new(contents.to_vec())),
            pos: 0,
            open: None,
        }
    }
}

impl File for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let data = self.data.lock().unwrap();
        let start = self.pos.min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let mut data = self.data.lock().unwrap();
        let start = self.pos.min(data.len());
        let n = buf.len().min(data.len() - start);
        data[start..start + n].copy_from_slice(&buf[..n]);
        self.pos += n;
        n
    }

    fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn tell(&self) -> usize {
        self.pos
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        if let Some(open) = &self.open {
            open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// -- console -----------------------------------------------------------------

#[derive(Default)]
struct Terminal {
    output: Vec<u8>,
    input: VecDeque<u8>,
}

/// Console device that records output and replays fed input.
#[derive(Clone, Default)]
pub struct CaptureConsole {
    terminal: Arc<Mutex<Terminal>>,
}

impl CaptureConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.terminal.lock().unwrap().output).into_owned()
    }

    /// Queue keyboard input.
    pub fn feed(&self, bytes: &[u8]) {
        self.terminal.lock().unwrap().input.extend(bytes);
    }
}

impl ConsoleDevice for CaptureConsole {
    fn put_bytes(&self, bytes: &[u8]) {
        self.terminal.lock().unwrap().output.extend_from_slice(bytes);
    }

    fn get_byte(&self) -> u8 {
        // An empty keyboard reads as NUL.
        self.terminal.lock().unwrap().input.pop_front().unwrap_or(0)
    }
}

// -- loader ------------------------------------------------------------------

/// Body of a user program: issues system calls through the `Rig` helpers.
pub type Program = Arc<dyn Fn(&Kernel, &mut Process, &MemSpace) + Send + Sync>;

/// Loader that runs registered programs on host threads.
#[derive(Clone)]
pub struct ThreadLoader {
    kernel: Arc<spin::Once<Weak<Kernel>>>,
    programs: Arc<Mutex<BTreeMap<String, Program>>>,
    next_pid: Arc<AtomicI32>,
    threads: Arc<Mutex<Vec<thread::JoinHandle<()>>>>,
}

impl ThreadLoader {
    pub fn new() -> Self {
        Self {
            kernel: Arc::new(spin::Once::new()),
            programs: Arc::default(),
            next_pid: Arc::default(),
            threads: Arc::default(),
        }
    }

    /// Make `name` loadable.
    pub fn register(
        &self,
        name: &str,
        program: impl Fn(&Kernel, &mut Process, &MemSpace) + Send + Sync + 'static,
    ) {
        self.programs
            .lock()
            .unwrap()
            .insert(name.into(), Arc::new(program));
    }

    /// Wait for every spawned program thread to finish.
    pub fn join_all(&self) {
        let threads: Vec<_> = self.threads.lock().unwrap().drain(..).collect();
        for handle in threads {
            handle.join().unwrap();
        }
    }
}

impl Loader for ThreadLoader {
    fn spawn(&self, cmdline: &str, notifier: ExitNotifier) -> Option<Pid> {
        let name = cmdline.split_whitespace().next()?;
        let program = self.programs.lock().unwrap().get(name)?.clone();
        let kernel = self.kernel.get()?.clone();
        let pid = Pid(self.next_pid.fetch_add(1, Ordering::SeqCst) + 100);
        let cmdline = String::from(cmdline);

        let handle = thread::spawn(move || {
            let Some(kernel) = kernel.upgrade() else {
                return;
            };
            let space = user_space();
            let mut process =
                Process::new(pid, &cmdline, Box::new(space.clone()), Some(notifier));
            program(&kernel, &mut process, &space);
            // Falling off the end of main exits with 0.
            process.terminate(&kernel, 0);
        });
        self.threads.lock().unwrap().push(handle);
        Some(pid)
    }
}

// -- rig ---------------------------------------------------------------------

/// Top of the user stack page.
pub const USER_STACK: usize = PHYS_BASE - PAGE_SIZE;

/// Start of the writable user data region.
pub const USER_DATA: usize = 0x0804_8000;

/// Pages in the user data region.
pub const USER_DATA_PAGES: usize = 4;

/// Where call words are placed on the stack page.
const CALL_ESP: usize = PHYS_BASE - 64;

fn user_space() -> MemSpace {
    let space = MemSpace::new();
    space.map(USER_STACK, 1, PageFlags::USER_DATA);
    space.map(USER_DATA, USER_DATA_PAGES, PageFlags::USER_DATA);
    space
}

/// A kernel assembled from host doubles.
pub struct Rig {
    pub kernel: Arc<Kernel>,
    pub console: CaptureConsole,
    pub fs: MemFs,
    pub loader: ThreadLoader,
}

impl Rig {
    pub fn new() -> Self {
        let cpu = HostCpu::new();
        let console = CaptureConsole::new();
        let fs = MemFs::new();
        let loader = ThreadLoader::new();
        let kernel = Arc::new(Kernel::new(Collaborators {
            cpu,
            console: Box::new(console.clone()),
            fs: Box::new(fs.clone()),
            loader: Box::new(loader.clone()),
        }));
        loader.kernel.call_once(|| Arc::downgrade(&kernel));
        Self {
            kernel,
            console,
            fs,
            loader,
        }
    }

    /// A process with a stack page and a data region, and no parent.
    pub fn process(&self, pid: Pid, cmdline: &str) -> (Process, MemSpace) {
        let space = user_space();
        let process = Process::new(pid, cmdline, Box::new(space.clone()), None);
        (process, space)
    }

    /// Like `process`, but reporting its exit through `parent`.
    pub fn process_with_parent(
        &self,
        pid: Pid,
        cmdline: &str,
        parent: ExitNotifier,
    ) -> (Process, MemSpace) {
        let space = user_space();
        let process = Process::new(pid, cmdline, Box::new(space.clone()), Some(parent));
        (process, space)
    }
}

/// Issue a system call: `words` is the call number followed by its
/// arguments. Returns the trap outcome and the return register.
pub fn syscall(
    kernel: &Kernel,
    process: &mut Process,
    space: &MemSpace,
    words: &[u32],
) -> (TrapExit, u32) {
    space.poke_words(CALL_ESP, words);
    let mut frame = TrapFrame::new(CALL_ESP);
    frame.eax = 0xdead_beef;
    let exit = crate::syscall::dispatch(kernel, process, &mut frame);
    (exit, frame.eax)
}

/// Place a NUL-terminated string in user memory and return its address.
pub fn user_str(space: &MemSpace, addr: usize, s: &str) -> u32 {
    space.poke(addr, s.as_bytes());
    space.poke(addr + s.len(), &[0]);
    addr as u32
}
