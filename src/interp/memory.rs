use super::value::Value;
use crate::parhist_runtime_error;
use crate::kernel::ast::ElemSize;
use crate::utils::err::*;
use crate::utils::info::Info;
use crate::utils::name::Name;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
pub struct Buffer {
    pub elem: ElemSize,
    pub data: Vec<Value>,
}

impl Buffer {
    pub fn new(elem: ElemSize, count: usize) -> Buffer {
        Buffer {elem, data: vec![Value::zero(elem); count]}
    }

    pub fn from_values(elem: ElemSize, values: Vec<Value>) -> Buffer {
        let data = values.into_iter().map(|v| v.convert(elem)).collect();
        Buffer {elem, data}
    }
}

// A buffer may be referred to by multiple names, as a result of aliasing one array as another.
pub type BufferRef = Rc<RefCell<Buffer>>;

// The arrays visible to the code being executed, by name.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    arrays: BTreeMap<Name, BufferRef>,
}

fn checked_index(id: &Name, len: usize, idx: i64, i: &Info) -> CompileResult<usize> {
    if idx < 0 || idx as usize >= len {
        parhist_runtime_error!(i, "Index {idx} out of bounds of array {id} of length {len}")
    } else {
        Ok(idx as usize)
    }
}

fn checked_range(id: &Name, len: usize, offset: i64, count: i64, i: &Info) -> CompileResult<(usize, usize)> {
    if count < 0 || offset < 0 || (offset as usize).saturating_add(count as usize) > len {
        parhist_runtime_error!(
            i, "Range of {count} elements at offset {offset} out of bounds of array {id} \
                of length {len}"
        )
    } else {
        Ok((offset as usize, count as usize))
    }
}

impl Memory {
    pub fn insert(&mut self, id: Name, buf: Buffer) {
        self.arrays.insert(id, Rc::new(RefCell::new(buf)));
    }

    pub fn lookup(&self, id: &Name, i: &Info) -> CompileResult<BufferRef> {
        match self.arrays.get(id) {
            Some(b) => Ok(b.clone()),
            None => parhist_runtime_error!(i, "Reference to unknown array {id}")
        }
    }

    pub fn alias(&mut self, dst: &Name, src: &Name, i: &Info) -> CompileResult<()> {
        let buf = self.lookup(src, i)?;
        self.arrays.insert(dst.clone(), buf);
        Ok(())
    }

    pub fn remove(&mut self, id: &Name, i: &Info) -> CompileResult<()> {
        match self.arrays.remove(id) {
            Some(_) => Ok(()),
            None => parhist_runtime_error!(i, "Cannot free unknown array {id}")
        }
    }

    pub fn contains(&self, id: &Name) -> bool {
        self.arrays.contains_key(id)
    }

    pub fn read(&self, id: &Name, idx: i64, i: &Info) -> CompileResult<Value> {
        let buf = self.lookup(id, i)?;
        let buf = buf.borrow();
        let idx = checked_index(id, buf.data.len(), idx, i)?;
        let v = buf.data[idx];
        Ok(v)
    }

    // Writes a value to an array, converting it to the element type of the array. Returns the
    // previously stored value.
    pub fn write(&self, id: &Name, idx: i64, v: Value, i: &Info) -> CompileResult<Value> {
        let buf = self.lookup(id, i)?;
        let mut buf = buf.borrow_mut();
        let idx = checked_index(id, buf.data.len(), idx, i)?;
        let v = v.convert(buf.elem);
        Ok(std::mem::replace(&mut buf.data[idx], v))
    }

    pub fn elem_size(&self, id: &Name, i: &Info) -> CompileResult<ElemSize> {
        let buf = self.lookup(id, i)?;
        let elem = buf.borrow().elem;
        Ok(elem)
    }

    pub fn fill(&self, id: &Name, offset: i64, count: i64, v: Value, i: &Info) -> CompileResult<()> {
        let buf = self.lookup(id, i)?;
        let mut buf = buf.borrow_mut();
        let (offset, count) = checked_range(id, buf.data.len(), offset, count, i)?;
        let v = v.convert(buf.elem);
        buf.data[offset..offset+count].fill(v);
        Ok(())
    }

    pub fn copy(
        &self,
        dst: &Name,
        dst_offset: i64,
        src: &Name,
        src_offset: i64,
        count: i64,
        i: &Info
    ) -> CompileResult<()> {
        // The source is read before writing, as the arrays may alias.
        let values = {
            let buf = self.lookup(src, i)?;
            let buf = buf.borrow();
            let (offset, count) = checked_range(src, buf.data.len(), src_offset, count, i)?;
            let values = buf.data[offset..offset+count].to_vec();
            values
        };
        let buf = self.lookup(dst, i)?;
        let mut buf = buf.borrow_mut();
        let (offset, count) = checked_range(dst, buf.data.len(), dst_offset, count, i)?;
        let elem = buf.elem;
        for (slot, v) in buf.data[offset..offset+count].iter_mut().zip(values.into_iter()) {
            *slot = v.convert(elem);
        }
        Ok(())
    }

    pub fn values(&self, id: &Name, i: &Info) -> CompileResult<Vec<Value>> {
        let buf = self.lookup(id, i)?;
        let values = buf.borrow().data.clone();
        Ok(values)
    }
}
