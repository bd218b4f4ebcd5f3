//! Safe wrappers around FFmpeg FFI calls.
//!
//! Every function in this module is `pub` and **safe** to call. All `unsafe`
//! blocks are contained here with explicit safety arguments. Callers outside
//! this module should never need to write `unsafe` for routine FFmpeg access.

use ffmpeg_next as ffmpeg;

// ── Frame plane access ──────────────────────────────────────────────────────

/// Extract the first data plane of an audio frame.
///
/// Works around `ffmpeg-next`'s `Audio::data(index)` which stops counting
/// planes when `linesize[1] == 0`. Packed formats keep every channel in plane 0.
pub fn audio_plane_data(frame: &ffmpeg::util::frame::Audio, index: usize) -> &[u8] {
    // SAFETY: `frame.as_ptr()` is valid for the lifetime of `frame`. We only
    // read `extended_data[index]` after bounds-checking `index` against the
    // frame's plane count, and `linesize[0]` is the allocated size of every plane.
    unsafe {
        let f = frame.as_ptr();
        let planes = if frame.format().is_planar() {
            (*f).ch_layout.nb_channels as usize
        } else {
            1
        };
        if index >= planes {
            return &[];
        }

        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &[];
        }
        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &[];
        }

        let size = (*f).linesize[0].max(0) as usize;
        std::slice::from_raw_parts(plane_ptr, size)
    }
}

/// Mutable version of [`audio_plane_data`].
pub fn audio_plane_data_mut(frame: &mut ffmpeg::util::frame::Audio, index: usize) -> &mut [u8] {
    // SAFETY: same as `audio_plane_data`; we hold a unique borrow of `frame`.
    unsafe {
        let planar = frame.format().is_planar();
        let f = frame.as_mut_ptr();
        let planes = if planar {
            (*f).ch_layout.nb_channels as usize
        } else {
            1
        };
        if index >= planes {
            return &mut [];
        }

        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &mut [];
        }
        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &mut [];
        }

        let size = (*f).linesize[0].max(0) as usize;
        std::slice::from_raw_parts_mut(plane_ptr, size)
    }
}

/// Reinterpret a raw plane as `count` native-endian f32 values.
///
/// Returns `None` if the pointer is not 4-byte aligned or the slice is shorter
/// than `count * 4` bytes.
pub fn plane_as_f32(byte_slice: &[u8], count: usize) -> Option<&[f32]> {
    let expected_bytes = count.checked_mul(4)?;
    if byte_slice.len() < expected_bytes {
        return None;
    }
    let ptr = byte_slice.as_ptr();
    if (ptr as usize) % std::mem::align_of::<f32>() != 0 {
        return None;
    }
    // SAFETY: alignment and length are verified above. FLT planes are
    // native-endian f32 values laid out contiguously.
    Some(unsafe { std::slice::from_raw_parts(ptr as *const f32, count) })
}

/// Mutable version of [`plane_as_f32`].
pub fn plane_as_f32_mut(byte_slice: &mut [u8], count: usize) -> Option<&mut [f32]> {
    let expected_bytes = count.checked_mul(4)?;
    if byte_slice.len() < expected_bytes {
        return None;
    }
    let ptr = byte_slice.as_mut_ptr();
    if (ptr as usize) % std::mem::align_of::<f32>() != 0 {
        return None;
    }
    // SAFETY: as above, plus the unique borrow of `byte_slice`.
    Some(unsafe { std::slice::from_raw_parts_mut(ptr as *mut f32, count) })
}

/// Interleaved samples of a packed-f32 (`FLT`) frame.
pub fn packed_f32_samples(frame: &ffmpeg::util::frame::Audio) -> Option<&[f32]> {
    let count = frame.samples().checked_mul(frame.channels() as usize)?;
    plane_as_f32(audio_plane_data(frame, 0), count)
}

/// Copy interleaved samples into a packed-f32 frame allocated for exactly
/// `samples.len() / channels` samples.
pub fn write_packed_f32(frame: &mut ffmpeg::util::frame::Audio, samples: &[f32]) -> bool {
    match plane_as_f32_mut(audio_plane_data_mut(frame, 0), samples.len()) {
        Some(dst) => {
            dst.copy_from_slice(samples);
            true
        }
        None => false,
    }
}

// ── Resampler ───────────────────────────────────────────────────────────────

/// Upper bound on the samples per channel the resampler can return for
/// `in_samples` more input, including what it has buffered.
pub fn resampler_max_output(
    context: &mut ffmpeg::software::resampling::Context,
    in_samples: usize,
) -> usize {
    // SAFETY: `as_mut_ptr` yields the live `SwrContext` owned by `context`;
    // `swr_get_out_samples` only reads its delay state.
    let n = unsafe {
        ffmpeg::ffi::swr_get_out_samples(context.as_mut_ptr(), in_samples.min(i32::MAX as usize) as i32)
    };
    n.max(0) as usize
}

/// Apply filter options to a resampler and re-initialize it.
///
/// `swr_init` may be called again on a configured context; the new
/// `filter_size` and `cutoff` take effect from that point.
pub fn resampler_set_filter(
    context: &mut ffmpeg::software::resampling::Context,
    filter_size: i64,
    cutoff: f64,
) -> Result<(), ffmpeg::Error> {
    // SAFETY: `as_mut_ptr` yields the live `SwrContext` owned by `context`,
    // which is an AVOptions-enabled object. Option names are NUL-terminated
    // literals.
    unsafe {
        let ctx = context.as_mut_ptr();
        let ret = ffmpeg::ffi::av_opt_set_int(ctx as *mut _, c"filter_size".as_ptr(), filter_size, 0);
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret));
        }
        let ret = ffmpeg::ffi::av_opt_set_double(ctx as *mut _, c"cutoff".as_ptr(), cutoff, 0);
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret));
        }
        let ret = ffmpeg::ffi::swr_init(ctx);
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret));
        }
    }
    Ok(())
}

/// Allocate a fresh `AVCodecParameters`, copy the encoder context into it,
/// and return it as a safe `ffmpeg::codec::Parameters`.
///
/// Used to describe the encoded stream to the muxer.
pub fn encoder_codec_parameters(
    encoder: &ffmpeg::codec::encoder::Audio,
) -> ffmpeg::codec::Parameters {
    use std::ops::Deref;
    use std::rc::Rc;
    let ctx: &ffmpeg::codec::Context = encoder.deref();
    // SAFETY: `avcodec_parameters_alloc` returns a valid pointer (allocation
    // failure is OOM). `avcodec_parameters_from_context` copies fields from a
    // live, opened encoder context.
    unsafe {
        let params = ffmpeg::ffi::avcodec_parameters_alloc();
        ffmpeg::ffi::avcodec_parameters_from_context(params, ctx.as_ptr());
        ffmpeg::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>)
    }
}

// ── Muxer ───────────────────────────────────────────────────────────────────

/// Mark an output context bit-exact so identical input produces identical bytes.
pub fn output_set_bitexact(output: &mut ffmpeg::format::context::Output) {
    // SAFETY: `output.as_mut_ptr()` is valid for the lifetime of `output` and
    // `flags` is a plain int field.
    unsafe {
        let ctx = output.as_mut_ptr();
        if !ctx.is_null() {
            (*ctx).flags |= ffmpeg::ffi::AVFMT_FLAG_BITEXACT as i32;
        }
    }
}
