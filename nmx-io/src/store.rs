//! Small HDF5 helpers shared by the storage types.

use crate::{Error, Result};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, Group};
use ndarray::{s, ArrayView1, ArrayView2};
use std::str::FromStr;

/// Creates a chunked `[0.., cols]` dataset that grows along dimension 0.
pub(crate) fn create_extendable_rows<T: H5Type>(
    group: &Group,
    name: &str,
    cols: usize,
    chunk_rows: usize,
) -> Result<Dataset> {
    let dataset = group
        .new_dataset::<T>()
        .shape((0.., cols))
        .chunk((chunk_rows.max(1), cols))
        .create(name)?;
    log::debug!("created dataset {name} [*, {cols}] chunk {chunk_rows}");
    Ok(dataset)
}

/// Creates a chunked one-dimensional dataset that can be resized.
pub(crate) fn create_extendable_vec<T: H5Type>(
    group: &Group,
    name: &str,
    chunk: usize,
) -> Result<Dataset> {
    Ok(group
        .new_dataset::<T>()
        .shape((0..,))
        .chunk((chunk.max(1),))
        .create(name)?)
}

/// Appends `rows` (row-major, `cols` wide) at the dataset's current tail.
/// Returns the index of the first appended row.
pub(crate) fn append_rows<T: H5Type>(dataset: &Dataset, cols: usize, rows: &[T]) -> Result<u64> {
    let offset = row_count(dataset)?;
    if rows.is_empty() {
        return Ok(offset as u64);
    }
    let added = rows.len() / cols;
    let view = ArrayView2::from_shape((added, cols), rows)
        .map_err(|e| Error::InvalidFormat(format!("row buffer: {e}")))?;
    let new_len = offset + added;
    dataset.resize((new_len, cols))?;
    dataset.write_slice(view, s![offset..new_len, ..])?;
    Ok(offset as u64)
}

/// Reads rows `[start, end)` flattened in row-major order.
pub(crate) fn read_rows<T: H5Type + Copy>(dataset: &Dataset, start: usize, end: usize) -> Result<Vec<T>> {
    if start >= end {
        return Ok(Vec::new());
    }
    let block = dataset.read_slice_2d::<T, _>(s![start..end, ..])?;
    Ok(block.iter().copied().collect())
}

/// Overwrites a resizable vector dataset with `data`.
pub(crate) fn write_vec<T: H5Type>(dataset: &Dataset, data: &[T]) -> Result<()> {
    dataset.resize((data.len(),))?;
    if !data.is_empty() {
        dataset.write_slice(ArrayView1::from(data), s![0..data.len()])?;
    }
    Ok(())
}

/// Length of dimension 0.
pub(crate) fn row_count(dataset: &Dataset) -> Result<usize> {
    dataset
        .shape()
        .first()
        .copied()
        .ok_or_else(|| Error::InvalidFormat("scalar dataset".to_string()))
}

/// Opens `name` only if it is a dataset of the expected rank and, when
/// given, trailing column count.
pub(crate) fn open_shaped(group: &Group, name: &str, ndim: usize, cols: Option<usize>) -> Result<Dataset> {
    if !group.link_exists(name) {
        return Err(Error::NotFound(name.to_string()));
    }
    let dataset = group
        .dataset(name)
        .map_err(|_| Error::NotFound(format!("{name} is not a dataset")))?;
    let shape = dataset.shape();
    let cols_ok = cols.map_or(true, |c| shape.last() == Some(&c));
    if shape.len() != ndim || !cols_ok {
        return Err(Error::NotFound(format!("{name} has shape {shape:?}")));
    }
    Ok(dataset)
}

/// Writes a scalar attribute, creating it or overwriting the existing one.
pub(crate) fn set_attr<T: H5Type>(location: &hdf5::Location, name: &str, value: &T) -> Result<()> {
    match location.attr(name) {
        Ok(attr) => attr.write_scalar(value)?,
        Err(_) => location.new_attr::<T>().create(name)?.write_scalar(value)?,
    }
    Ok(())
}

pub(crate) fn set_attr_str(location: &hdf5::Location, name: &str, value: &str) -> Result<()> {
    set_attr(location, name, &to_var_len_unicode(value)?)
}

pub(crate) fn read_attr_opt<T: H5Type + Clone>(location: &hdf5::Location, name: &str) -> Result<Option<T>> {
    match location.attr(name) {
        Ok(attr) => Ok(Some(attr.read_scalar::<T>()?)),
        Err(_) => Ok(None),
    }
}

pub(crate) fn read_attr_opt_string(location: &hdf5::Location, name: &str) -> Result<Option<String>> {
    match location.attr(name) {
        Ok(attr) => {
            let value: VarLenUnicode = attr.read_scalar()?;
            Ok(Some(value.to_string()))
        }
        Err(_) => Ok(None),
    }
}

pub(crate) fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

/// Opens child group `name`, or `None` if there is no such link.
pub(crate) fn child_group(group: &Group, name: &str) -> Result<Option<Group>> {
    if group.link_exists(name) {
        Ok(Some(group.group(name)?))
    } else {
        Ok(None)
    }
}

/// Opens child group `name`, creating it when missing.
pub(crate) fn require_group(group: &Group, name: &str) -> Result<Group> {
    match child_group(group, name)? {
        Some(g) => Ok(g),
        None => Ok(group.create_group(name)?),
    }
}
