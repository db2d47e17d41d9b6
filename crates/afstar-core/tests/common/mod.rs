//! Builders for synthetic volume dumps

#![allow(dead_code)]

pub const BEGIN_MAGIC: u32 = 0xB3A1_1322;
pub const END_MAGIC: u32 = 0x3A21_4B6E;

pub const TYPE_FILE: u8 = 1;
pub const TYPE_DIR: u8 = 2;
pub const TYPE_SYMLINK: u8 = 3;

const DIR_PAGE_SIZE: usize = 4096;
const DIR_ENTRY_SIZE: usize = 32;
const DIR_HEADER_SLOTS: usize = 13;
const DIR_HASH_TABLE: usize = 160;
const DIR_HASH_SIZE: usize = 128;

/// Fields of one vnode record
#[derive(Debug, Clone)]
pub struct VNodeFields {
    pub id: u32,
    pub vtype: u8,
    pub parent: u32,
    pub owner: u32,
    pub group: u32,
    pub mode: u16,
    pub mtime: u32,
    pub acl_positive: Vec<(i32, i32)>,
    pub acl_negative: Vec<(i32, i32)>,
    /// Size written to the record; defaults to the payload length
    pub declared_size: Option<u64>,
    /// Use the 64-bit size tag
    pub large_size: bool,
    pub payload: Vec<u8>,
}

impl VNodeFields {
    pub fn new(id: u32, vtype: u8, parent: u32, payload: Vec<u8>) -> Self {
        Self {
            id,
            vtype,
            parent,
            owner: 1021,
            group: 100,
            mode: if vtype == TYPE_DIR { 0o755 } else { 0o644 },
            mtime: 1_700_000_000,
            acl_positive: Vec::new(),
            acl_negative: Vec::new(),
            declared_size: None,
            large_size: false,
            payload,
        }
    }

    pub fn directory(id: u32, parent: u32, children: &[(&str, u32)]) -> Self {
        Self::new(id, TYPE_DIR, parent, directory_blob(id, parent, children))
    }

    pub fn file(id: u32, parent: u32, data: &[u8]) -> Self {
        Self::new(id, TYPE_FILE, parent, data.to_vec())
    }

    pub fn symlink(id: u32, parent: u32, target: &str) -> Self {
        Self::new(id, TYPE_SYMLINK, parent, target.as_bytes().to_vec())
    }
}

/// Root directory holding `hello.txt` with five bytes of data
pub fn hello_dump() -> Vec<u8> {
    DumpBuilder::new("user.alice")
        .volume(536_870_912, "user.alice")
        .vnode(VNodeFields::directory(1, 1, &[("hello.txt", 2)]))
        .vnode(VNodeFields::file(2, 1, b"hello"))
        .finish()
}

/// Assembles a dump stream record by record
pub struct DumpBuilder {
    data: Vec<u8>,
}

impl DumpBuilder {
    /// Dump header for volume `name`
    pub fn new(name: &str) -> Self {
        Self::with_header(BEGIN_MAGIC, 1, name)
    }

    pub fn with_header(magic: u32, version: u32, name: &str) -> Self {
        let mut builder = Self { data: vec![1] };
        builder.u32(magic);
        builder.u32(version);
        builder.tag(b'v');
        builder.u32(536_870_912);
        builder.tag(b'n');
        builder.string(name);
        builder.tag(b't');
        builder.data.extend_from_slice(&2u16.to_be_bytes());
        builder.u32(0);
        builder.u32(1_700_000_000);
        builder
    }

    pub fn volume(mut self, id: u32, name: &str) -> Self {
        self.data.push(2);
        self.tag(b'i');
        self.u32(id);
        self.tag(b'v');
        self.u32(1);
        self.tag(b'n');
        self.string(name);
        self.tag(b's');
        self.data.push(1);
        self.tag(b'b');
        self.data.push(1);
        self.tag(b'W');
        self.data.extend_from_slice(&7u16.to_be_bytes());
        for day in 0..7 {
            self.u32(day);
        }
        self
    }

    pub fn vnode(mut self, fields: VNodeFields) -> Self {
        self.data.push(3);
        self.u32(fields.id);
        self.u32(1);
        self.tag(b't');
        self.data.push(fields.vtype);
        self.tag(b'l');
        self.data.extend_from_slice(&1u16.to_be_bytes());
        self.tag(b'v');
        self.u32(1);
        self.tag(b'm');
        self.u32(fields.mtime);
        self.tag(b's');
        self.u32(fields.mtime);
        self.tag(b'a');
        self.u32(fields.owner);
        self.tag(b'o');
        self.u32(fields.owner);
        self.tag(b'g');
        self.u32(fields.group);
        self.tag(b'b');
        self.data.extend_from_slice(&fields.mode.to_be_bytes());
        self.tag(b'p');
        self.u32(fields.parent);
        self.tag(b'A');
        self.acl(&fields.acl_positive, &fields.acl_negative);

        let size = fields
            .declared_size
            .unwrap_or(fields.payload.len() as u64);
        if fields.large_size {
            self.tag(b'h');
            self.u32((size >> 32) as u32);
            self.u32(size as u32);
        } else {
            self.tag(b'f');
            self.u32(size as u32);
        }
        self.data.extend_from_slice(&fields.payload);
        self
    }

    /// A record with an arbitrary vnode type and a payload
    pub fn raw_vnode(mut self, id: u32, vtype: u8, payload: &[u8]) -> Self {
        self.data.push(3);
        self.u32(id);
        self.u32(1);
        self.tag(b't');
        self.data.push(vtype);
        self.tag(b'f');
        self.u32(payload.len() as u32);
        self.data.extend_from_slice(payload);
        self
    }

    /// End of dump record and trailing magic
    pub fn finish(self) -> Vec<u8> {
        self.finish_with_magic(END_MAGIC)
    }

    pub fn finish_with_magic(mut self, magic: u32) -> Vec<u8> {
        self.data.push(4);
        self.u32(magic);
        self.data
    }

    /// The stream as built so far, without an end record
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn tag(&mut self, tag: u8) {
        self.data.push(tag);
    }

    fn u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    fn string(&mut self, value: &str) {
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
    }

    fn acl(&mut self, positive: &[(i32, i32)], negative: &[(i32, i32)]) {
        let total = (positive.len() + negative.len()) as i32;
        for word in [192, 1, total, positive.len() as i32, negative.len() as i32] {
            self.data.extend_from_slice(&word.to_be_bytes());
        }
        let mut entries: Vec<(i32, i32)> = positive.iter().chain(negative).copied().collect();
        entries.resize(21, (0, 0));
        for (id, rights) in entries {
            self.data.extend_from_slice(&id.to_be_bytes());
            self.data.extend_from_slice(&rights.to_be_bytes());
        }
        self.data.extend_from_slice(&0i32.to_be_bytes());
    }
}

/// A one-page hashed directory listing `.`, `..` and `children`
pub fn directory_blob(id: u32, parent: u32, children: &[(&str, u32)]) -> Vec<u8> {
    let mut data = vec![0u8; DIR_PAGE_SIZE];
    data[0..2].copy_from_slice(&1u16.to_be_bytes());

    let mut slot = DIR_HEADER_SLOTS;
    let dots = [(".", id), ("..", parent)];
    for &(name, vnode) in dots.iter().chain(children) {
        let bucket = name.bytes().map(|b| b as usize).sum::<usize>() % DIR_HASH_SIZE;
        let table = DIR_HASH_TABLE + bucket * 2;
        let offset = slot * DIR_ENTRY_SIZE;

        data[offset] = 1;
        data[offset + 2] = data[table];
        data[offset + 3] = data[table + 1];
        data[offset + 4..offset + 8].copy_from_slice(&vnode.to_be_bytes());
        data[offset + 8..offset + 12].copy_from_slice(&1u32.to_be_bytes());
        data[offset + 12..offset + 12 + name.len()].copy_from_slice(name.as_bytes());
        data[table..table + 2].copy_from_slice(&(slot as u16).to_be_bytes());

        let extra = (name.len() + 1).saturating_sub(20).div_ceil(DIR_ENTRY_SIZE);
        slot += 1 + extra;
    }
    data
}
